use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use noaa_cdo::fetch::paginator::page_offsets;
use noaa_cdo::{format_size, split, Dataset, DateRange, Query, WhitelistStore};

fn century() -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(1900, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
    )
    .unwrap()
}

fn bench_pipeline(c: &mut Criterion) {
    let range = century();
    c.bench_function("split_century", |b| {
        b.iter(|| split(black_box(range), black_box(10)))
    });

    let query = Query::builder()
        .dataset(Dataset::Gsom)
        .range(range)
        .location_id("FIPS:BR")
        .station_id("GHCND:BR000352000")
        .build();
    c.bench_function("fingerprint", |b| b.iter(|| black_box(&query).fingerprint()));

    c.bench_function("page_offsets", |b| {
        b.iter(|| page_offsets(black_box(1_250_000), black_box(1000)).count())
    });

    c.bench_function("whitelist_record_success", |b| {
        let now = chrono::Utc::now();
        b.iter(|| {
            let mut store = WhitelistStore::new("CNTRY", "", now);
            for i in 0..200u64 {
                let entry = noaa_cdo::StationEntry {
                    items: i,
                    size: i * 100,
                };
                store.record_success("FIPS:BR", &format!("GHCND:{i}"), entry, now);
            }
            format_size(store.metadata.total_size)
        })
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
