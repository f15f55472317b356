//! Renders a sample listing and a sample search failure through the dispatcher
//! (log transport only, nothing is sent).

use std::sync::Arc;

use chrono::Utc;
use listing_watch::notify::{LogTransport, NotificationDispatcher, Notice};
use listing_watch::{Listing, ListingId};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(tracing::Level::DEBUG)
        .init();
    let dispatcher = NotificationDispatcher::new(Arc::new(LogTransport), "DoNotReply@watch.example");
    let to = "ops@example.com";

    let listing = Listing {
        id: ListingId::from("2841553112"),
        title: "Appartement 2 pièces meublé 38 m²".into(),
        body: "Proche métro, lumineux, libre au 1er.".into(),
        price: Some(1190.0),
        url: "https://www.leboncoin.fr/ad/locations/2841553112".into(),
        images: vec!["https://img.leboncoin.fr/api/v1/lbcpb1/images/demo.jpg".into()],
        published_at: Utc::now(),
    };

    let outcomes = [
        dispatcher.notify(&Notice::Listing(&listing), to).await,
        dispatcher
            .notify(
                &Notice::FetchFailure {
                    message: "search endpoint answered 403: blocked".into(),
                },
                to,
            )
            .await,
    ];

    for o in outcomes {
        println!("{o}");
    }
    println!("notify-demo done");
}
