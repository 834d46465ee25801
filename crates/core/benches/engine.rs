use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use gleaner_core::config::ProjectConfig;
use gleaner_core::{Document, Program, best_selector, detect_list, detect_table, materialize, run};

/// A catalogue page with `items` product cards.
fn catalogue(items: usize) -> String {
    let mut html = String::from(r#"<html><body><section id="catalogue"><div class="grid">"#);
    for i in 0..items {
        html.push_str(&format!(
            r#"<article class="product card"><h2 class="name">Item {i}</h2><p class="price">${i}.00</p><a class="details" href="/p/{i}">Details</a><img src="/img/{i}.jpg"><ul class="tags"><li><span>t{i}</span></li></ul></article>"#
        ));
    }
    html.push_str("</div></section></body></html>");
    html
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for items in [10, 100, 1000] {
        let html = catalogue(items);
        group.bench_with_input(BenchmarkId::new("catalogue", items), &html, |b, html| {
            b.iter(|| Document::parse(black_box(html)))
        });
    }

    group.finish();
}

fn bench_synthesize(c: &mut Criterion) {
    let html = catalogue(100);
    let doc = Document::parse(&html).unwrap();
    let target = doc.select("p.price").unwrap()[50];

    c.bench_function("best_selector", |b| b.iter(|| best_selector(black_box(&doc), target)));
}

fn bench_detect(c: &mut Criterion) {
    let html = catalogue(100);
    let doc = Document::parse(&html).unwrap();
    let seed = doc.select("article.product").unwrap()[10];

    c.bench_function("detect_list", |b| b.iter(|| detect_list(black_box(&doc), seed)));

    let scores = std::fs::read_to_string("../../tests/fixtures/scores.html").unwrap();
    let doc = Document::parse(&scores).unwrap();
    let cell = doc.select("td").unwrap()[0];

    c.bench_function("detect_table", |b| b.iter(|| detect_table(black_box(&doc), cell)));
}

fn bench_execute(c: &mut Criterion) {
    let config = ProjectConfig::load("../../tests/fixtures/listing.yaml").unwrap();
    let html = catalogue(100);
    let doc = Document::parse(&html).unwrap();
    let program = Program::compile(&config.rules).unwrap();

    c.bench_function("execute", |b| b.iter(|| program.execute(black_box(&doc))));

    let record = program.execute(&doc);
    c.bench_function("materialize", |b| b.iter(|| materialize(black_box(&record), &config.rules)));

    let pages: Vec<String> = (0..10).map(|_| catalogue(50)).collect();
    c.bench_function("run_10_pages", |b| b.iter(|| run(&config.rules, black_box(&pages))));
}

criterion_group!(benches, bench_parse, bench_synthesize, bench_detect, bench_execute);
criterion_main!(benches);
