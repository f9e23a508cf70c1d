extern crate feed_sync as feed;

use std::cell::RefCell;
use std::env;
use std::io;
use std::process;
use std::rc::Rc;

use tokio::runtime::current_thread::Runtime;

use feed::clock::SystemClock;
use feed::comment;
use feed::thread::Threads;
use feed::{Config, HttpRemote, ItemId, Session, ViewCache};

fn main() {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let config = Config::from_env().unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(2);
    });
    let remote = HttpRemote::from_config(&config).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(2);
    });

    let clock = Rc::new(SystemClock);
    let cache = Rc::new(RefCell::new(ViewCache::new(config.view_ttl, clock.clone())));
    let threads = Rc::new(RefCell::new(Threads::new()));
    let session = Session::new(config.me.clone(), Rc::new(remote), clock, cache, threads);

    let mut rt = Runtime::new().expect("failed to start runtime");

    let items = rt
        .block_on(session.view(&config.default_view))
        .unwrap_or_else(|err| {
            eprintln!("could not load {}: {}", config.default_view, err);
            process::exit(1);
        });
    for item in &items {
        let reposter = item
            .projected_from
            .as_ref()
            .map(|projection| format!(" (reposted by {})", projection.by.label()))
            .unwrap_or_default();
        println!(
            "{}  {}{}  ♥{} ⟳{} ⚑{} ✉{}",
            item.id,
            item.author.label(),
            reposter,
            item.engagement.likes,
            item.engagement.reposts,
            item.engagement.bookmarks,
            item.engagement.replies,
        );
    }

    if let Some(id) = env::args().nth(1) {
        let thread = rt
            .block_on(session.open_thread(&ItemId::new(id.as_str())))
            .unwrap_or_else(|err| {
                eprintln!("could not load replies for {}: {}", id, err);
                process::exit(1);
            });
        for (reply, depth) in comment::flatten(&thread) {
            println!("{}{}: {}", "  ".repeat(depth), reply.author.label(), reply.content);
        }
    }
}
