// WASM entrypoint for Trunk. Native builds do nothing.

fn main() {
    #[cfg(all(feature = "web", target_arch = "wasm32"))]
    exbert_web::start();
}
