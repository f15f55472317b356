// src/notify/render.rs
//! Subject and HTML body for each kind of notice.

use html_escape::{encode_double_quoted_attribute, encode_text};

use super::Notice;
use crate::listing::Listing;

pub const NO_PICTURES: &str = "No pictures";

pub fn subject(notice: &Notice<'_>) -> String {
    match notice {
        Notice::Listing(l) => format!("Nouvelle annonce : {}", l.title),
        Notice::FetchFailure { .. } => "Erreur client.search".to_string(),
    }
}

pub fn html_body(notice: &Notice<'_>) -> String {
    match notice {
        Notice::Listing(l) => listing_html(l),
        Notice::FetchFailure { message } => format!(
            "<h2>Erreur client.search</h2>\n<p>{}</p>\n",
            encode_text(message)
        ),
    }
}

/// `1100.0` → `1100`, `1099.5` → `1099.50`, missing → empty.
pub fn format_price(price: Option<f64>) -> String {
    match price {
        Some(p) if p.fract() == 0.0 => format!("{p:.0}"),
        Some(p) => format!("{p:.2}"),
        None => String::new(),
    }
}

fn listing_html(l: &Listing) -> String {
    let pictures = if l.images.is_empty() {
        NO_PICTURES.to_string()
    } else {
        l.images
            .iter()
            .map(|url| {
                format!(
                    "<img src=\"{}\" style=\"max-width:300px; margin:5px;\">",
                    encode_double_quoted_attribute(url)
                )
            })
            .collect::<String>()
    };

    format!(
        "<h2>{title}</h2>\n<p>{body}</p>\n<p><strong>Prix :</strong> {price} €</p>\n<p><a href=\"{url}\">Voir l'annonce</a></p>\n<p>\n{pictures}\n</p>\n",
        title = encode_text(&l.title),
        body = encode_text(&l.body),
        price = format_price(l.price),
        url = encode_double_quoted_attribute(&l.url),
    )
}
