use std::fmt::Write as _;

use devline_deviantart::about::{parse_about, parse_gallery_links};
use devline_deviantart::transform::parse_gallery;
use serde_json::{Value, json};

/// About page with `n` group links and `n` watched deviants
fn synthetic_about(n: usize) -> String {
    let mut html = String::from(
        r#"<html><body><div id="userstats">Pageviews 12,345 Deviations 67 Watchers 890
           Watching 12 Favourites 3,456 Comments Made 78 Comments Received 90</div>
           <section id="module-1234567890"><p>About me text</p></section>
           <div id="group_list_members">"#,
    );
    for i in 0..n {
        let _ = write!(html, "<a href=\"/group{i}\">Group {i}</a>");
    }
    html.push_str(r#"</div><div id="watching"><h2>Watching</h2>"#);
    for i in 0..n {
        let _ = write!(html, "<a href=\"/user{i}\">user{i}</a>");
    }
    html.push_str("</div></body></html>");
    html
}

fn synthetic_gallery_html(n: usize) -> String {
    let mut html = String::from("<html><body>");
    for i in 0..n {
        let _ = write!(
            html,
            "<div><a class=\"torpedo-thumb-link\" href=\"https://www.deviantart.com/amy/art/piece-{i}\">{i}</a></div>"
        );
    }
    html.push_str("</body></html>");
    html
}

fn synthetic_gallery_json(n: usize) -> Value {
    let results: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "deviationid": format!("ID-{i:08}"),
                "url": format!("https://www.deviantart.com/amy/art/piece-{i}"),
                "title": format!("Piece {i}"),
                "author": {"userid": "U1", "username": "amy", "type": "regular"},
                "published_time": "1683132000",
                "content": {"src": format!("https://img/{i}.jpg"), "height": 800, "width": 600},
                "stats": {"comments": i % 7, "favourites": i % 50},
                "is_mature": false,
                "is_downloadable": true
            })
        })
        .collect();
    json!({"has_more": true, "next_offset": n, "results": results})
}

#[divan::bench(args = [10, 100, 1000])]
fn about_page(bencher: divan::Bencher, n: usize) {
    let html = synthetic_about(n);
    bencher.bench(|| parse_about("amy", &html));
}

#[divan::bench(args = [24, 240])]
fn gallery_links(bencher: divan::Bencher, n: usize) {
    let html = synthetic_gallery_html(n);
    bencher.bench(|| parse_gallery_links(&html));
}

#[divan::bench(args = [24, 240])]
fn gallery_json(bencher: divan::Bencher, n: usize) {
    let body = synthetic_gallery_json(n);
    bencher.bench(|| parse_gallery(body.clone()));
}

fn main() {
    divan::main();
}
