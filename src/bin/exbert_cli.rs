//! Offline inspector for saved attention and search payloads.
//!
//! Examples:
//!   exbert-cli edges att.json --threshold 0.5 --heads 0,3
//!   exbert-cli heads att.json
//!   exbert-cli extents att.json --raw
//!   exbert-cli search hits.json --field dep
//!   exbert-cli query '?sentence=hello&heads=__0,1'
//!
//! `--settings <file>` loads the same JSON settings the web app embeds.

use std::process;

use exbert::api::{decode_attention, decode_search};
use exbert::attention::AttentionModel;
use exbert::component::{RecordingSurface, Widget};
use exbert::config::{ConfigStore, MemoryHistory, Side};
use exbert::edges::{to_edges, AxisExtents, Extent};
use exbert::float_fmt::fmt_f32_fixed;
use exbert::search::{count_matched, count_max_att, offset_histograms, Histogram, MetaField};
use exbert::settings::AppSettings;
use exbert::tokens::{strip_special, TokenMeta};
use exbert::widgets::{AttentionHeadBox, HeadBoxInput};

fn usage() -> ! {
    eprintln!("exbert-cli (reads saved backend responses)");
    eprintln!("Usage: exbert-cli [options] <command> [args]\n");
    eprintln!("Commands:");
    eprintln!("  edges <attention.json>      Thresholded edges of the selected heads");
    eprintln!("  heads <attention.json>      Per-head token summaries for both sides");
    eprintln!("  extents <attention.json>    Global and per-row min/max");
    eprintln!("  search <hits.json>          Matched, max-attention and offset histograms");
    eprintln!("  query <query-string>        Decode a page query into view settings");
    eprintln!("\nOptions:");
    eprintln!("  --settings <file>           App settings JSON");
    eprintln!("  --threshold <0-1>           Fraction of row mass to keep (default 0.7)");
    eprintln!("  --heads <i,j,...>           Heads to aggregate (default: all)");
    eprintln!("  --field <pos|dep|is_ent|norm>  Metadata field for histograms");
    eprintln!("  --raw                       Keep special tokens and their rows and columns");
    process::exit(1);
}

struct Options {
    settings: AppSettings,
    threshold: Option<f32>,
    heads: Option<Vec<usize>>,
    field: MetaField,
    raw: bool,
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    process::exit(1);
}

fn parse_args() -> (Options, Vec<String>) {
    let mut opts = Options {
        settings: AppSettings::default(),
        threshold: None,
        heads: None,
        field: MetaField::Pos,
        raw: false,
    };
    let mut rest = Vec::new();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().unwrap_or_else(|| fail(format!("{name} needs a value")));
        match arg.as_str() {
            "--settings" => {
                let path = value("--settings");
                let json = std::fs::read_to_string(&path)
                    .unwrap_or_else(|e| fail(format!("read {path}: {e}")));
                opts.settings = AppSettings::from_json(&json).unwrap_or_else(|e| fail(e));
            }
            "--threshold" => {
                let t = value("--threshold");
                opts.threshold = Some(
                    t.parse()
                        .unwrap_or_else(|_| fail("threshold must be a number in [0, 1]")),
                );
            }
            "--heads" => {
                let list = value("--heads");
                let heads = list
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(|s| s.trim().parse::<usize>())
                    .collect::<Result<Vec<_>, _>>()
                    .unwrap_or_else(|_| fail("heads must be comma-separated indexes"));
                opts.heads = Some(heads);
            }
            "--field" => {
                let f = value("--field");
                opts.field = MetaField::parse(&f)
                    .unwrap_or_else(|| fail("field must be pos|dep|is_ent|norm"));
            }
            "--raw" => opts.raw = true,
            "-h" | "--help" => usage(),
            _ => rest.push(arg),
        }
    }

    if rest.is_empty() {
        usage();
    }
    (opts, rest)
}

fn read(path: &str) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| fail(format!("read {path}: {e}")))
}

fn load_model(path: &str, opts: &Options) -> AttentionModel {
    let resp = decode_attention(&read(path)).unwrap_or_else(|e| fail(e));
    tracing::info!(
        heads = resp.att.n_heads(),
        queries = resp.att.n_queries(),
        keys = resp.att.n_keys(),
        "loaded attention"
    );
    let model = AttentionModel::from_response(&resp, &opts.settings.special_tokens, !opts.raw);
    println!("left:  {}", token_line(&resp.left, opts));
    println!("right: {}", token_line(&resp.right, opts));
    model
}

/// `index:text` per token, without special tokens unless `--raw`.
fn token_line(tokens: &[TokenMeta], opts: &Options) -> String {
    let shown: Vec<(usize, &TokenMeta)> = if opts.raw {
        tokens.iter().enumerate().collect()
    } else {
        strip_special(tokens, &opts.settings.special_tokens)
    };
    shown
        .into_iter()
        .map(|(i, t)| format!("{i}:{}", t.text))
        .collect::<Vec<_>>()
        .join(" ")
}

fn fmt_extent(e: &Extent) -> String {
    if e.is_empty() {
        return "empty".to_string();
    }
    format!("[{}, {}]", fmt_f32_fixed(e.min, 4), fmt_f32_fixed(e.max, 4))
}

fn print_histogram(title: &str, h: &Histogram) {
    println!("{title} (n={})", h.total());
    for (label, count) in h.sorted() {
        println!("  {label:<12} {count}");
    }
}

fn need(arg: Option<&str>) -> &str {
    arg.unwrap_or_else(|| usage())
}

fn main() {
    tracing_subscriber::fmt::init();

    let (opts, args) = parse_args();
    let arg = args.get(1).map(String::as_str);

    match args[0].as_str() {
        "edges" => {
            let model = load_model(need(arg), &opts);
            let heads = opts
                .heads
                .clone()
                .unwrap_or_else(|| (0..model.n_heads()).collect());
            if let Some(h) = heads.iter().find(|h| **h >= model.n_heads()) {
                fail(format!("head {h} out of range (tensor has {})", model.n_heads()));
            }
            let threshold = opts.threshold.unwrap_or(opts.settings.default_threshold);
            let matrix = model.by_heads(&heads);
            let edges = to_edges(&matrix, threshold);
            println!(
                "{} edges at threshold {} over heads {:?}",
                edges.len(),
                fmt_f32_fixed(threshold, 2),
                heads
            );
            for e in edges {
                println!("  {:>3} -> {:<3} {}", e.source, e.target, fmt_f32_fixed(e.weight, 4));
            }
        }
        "heads" => {
            let model = load_model(need(arg), &opts);
            let widget = AttentionHeadBox::new();
            let heads: Vec<_> = (0..model.n_heads()).map(|h| model.by_head(h).clone()).collect();
            for side in [Side::Left, Side::Right] {
                let input = HeadBoxInput {
                    heads: heads.clone(),
                    side,
                    selected: opts.heads.clone().unwrap_or_default(),
                };
                let summary = <AttentionHeadBox as Widget<RecordingSurface>>::wrangle(&widget, &input);
                println!("{} side:", side.as_str());
                for (h, values) in summary.values.iter().enumerate() {
                    let cells: Vec<String> = values.iter().map(|v| fmt_f32_fixed(*v, 2)).collect();
                    let mark = if summary.selected[h] { "*" } else { " " };
                    println!("  {mark}head {h:>2}: {}", cells.join(" "));
                }
            }
        }
        "extents" => {
            let model = load_model(need(arg), &opts);
            let ext = AxisExtents::of_tensor(model.active());
            println!("global: {}", fmt_extent(&ext.global));
            for (r, e) in ext.per_row.iter().enumerate() {
                println!("  row {r:>3}: {}", fmt_extent(e));
            }
        }
        "search" => {
            let hits = decode_search(&read(need(arg))).unwrap_or_else(|e| fail(e));
            tracing::info!(hits = hits.len(), "loaded search results");
            let field = opts.field;
            print_histogram(&format!("matched {}", field.as_str()), &count_matched(&hits, field));
            print_histogram(
                &format!("max attention {}", field.as_str()),
                &count_max_att(&hits, field),
            );
            for (offset, h) in offset_histograms(&hits, field, &[-2, -1, 1, 2]) {
                print_histogram(&format!("offset {offset}"), &h);
            }
        }
        "query" => {
            let store = ConfigStore::from_query(
                need(arg),
                &opts.settings.view_defaults(),
                MemoryHistory::default(),
            );
            for (key, value) in store.to_pairs() {
                println!("{key:<18} {}", value.encode());
            }
        }
        _ => usage(),
    }
}
