//! Float formatting without `format!` on floats.
//!
//! Float-to-decimal formatting in core has panicked on some wasm toolchain and
//! browser combinations. Everything that ends up in the page URL or on a canvas
//! label goes through these helpers instead: scale + round into an `i64`, then
//! format integers.

/// Fixed `decimals` digits after the point. `NaN`/`±Inf` are spelled out.
pub fn fmt_f64_fixed(v: f64, decimals: usize) -> String {
    if !v.is_finite() {
        return non_finite(v);
    }

    let decimals = decimals.min(9);
    let scale_i64 = 10_i64.pow(decimals as u32);
    let scaled = (v * scale_i64 as f64).round();
    if !scaled.is_finite() || scaled.abs() > (i64::MAX as f64) {
        return if v.is_sign_negative() {
            "-Inf".to_string()
        } else {
            "Inf".to_string()
        };
    }

    let scaled_i = scaled as i64;
    let abs_i = scaled_i.abs();
    let int_part = abs_i / scale_i64;
    let frac_part = abs_i % scale_i64;

    let mut out = String::new();
    if scaled_i < 0 {
        out.push('-');
    }
    out.push_str(&int_part.to_string());

    if decimals > 0 {
        out.push('.');
        let frac_str = frac_part.to_string();
        for _ in 0..decimals.saturating_sub(frac_str.len()) {
            out.push('0');
        }
        out.push_str(&frac_str);
    }
    out
}

pub fn fmt_f32_fixed(v: f32, decimals: usize) -> String {
    fmt_f64_fixed(v as f64, decimals)
}

/// Like [`fmt_f64_fixed`] with trailing zeros (and a bare point) removed.
pub fn fmt_f64_trimmed(v: f64, decimals: usize) -> String {
    let mut s = fmt_f64_fixed(v, decimals);
    if s.contains('.') && v.is_finite() {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

fn non_finite(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_sign_positive() {
        "Inf".to_string()
    } else {
        "-Inf".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_pads_and_rounds() {
        assert_eq!(fmt_f64_fixed(0.5, 3), "0.500");
        assert_eq!(fmt_f64_fixed(-1.25, 1), "-1.3");
        assert_eq!(fmt_f64_fixed(2.0, 0), "2");
        assert_eq!(fmt_f64_fixed(f64::NAN, 2), "NaN");
    }

    #[test]
    fn trimmed_drops_trailing_zeros() {
        assert_eq!(fmt_f64_trimmed(0.7f32 as f64, 6), "0.7");
        assert_eq!(fmt_f64_trimmed(1.0, 6), "1");
        assert_eq!(fmt_f64_trimmed(-0.0000001, 6), "0");
        assert_eq!(fmt_f64_trimmed(0.125, 6), "0.125");
    }
}
