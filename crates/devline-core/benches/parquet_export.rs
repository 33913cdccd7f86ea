use std::fmt::Write as _;

use devline_core::export_csv_to_parquet;

/// Gallery-shaped CSV with `n` rows
fn synthetic_gallery(n: usize) -> String {
    let mut out = String::from(
        "Deviation_id,Deviation_url,Deviation_title,Author_name,Published_on,Favourites\n",
    );
    for i in 0..n {
        let _ = writeln!(
            out,
            "ID-{i:08},https://www.deviantart.com/artist{}/art/piece-{i},Piece {i},artist{},2023-05-0{}T10:00:00-0700,{}",
            i % 97,
            i % 97,
            i % 9 + 1,
            i % 500
        );
    }
    out
}

#[divan::bench(args = [1, 3, 6])]
fn export_gallery_zstd(bencher: divan::Bencher, zstd_level: i32) {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("gallery.csv");
    std::fs::write(&csv, synthetic_gallery(20_000)).unwrap();
    let out = dir.path().join("parquet");
    bencher.bench(|| export_csv_to_parquet(&csv, &out, zstd_level).unwrap());
}

fn main() {
    divan::main();
}
