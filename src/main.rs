use std::sync::Arc;

use anyhow::Result;
use tokio::time::{sleep, Duration};

use tradebroker::auction::AuctionHouse;
use tradebroker::broker::Broker;
use tradebroker::catalog::resolver::{ItemResolver, ResolverConfig};
use tradebroker::catalog::CatalogKind;
use tradebroker::locks::KeyedLocks;
use tradebroker::logging::{log, obj, v_num, v_str, Domain, Level};
use tradebroker::ratelimit::RateGuard;
use tradebroker::state::{now_ts, Config};
use tradebroker::storage::Store;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    let store = Arc::new(Store::new(&cfg.sqlite_path)?);
    let kind = CatalogKind::from_env();
    let resolver = Arc::new(ItemResolver::new(
        kind.build(&cfg.catalog_base),
        ResolverConfig {
            refresh_secs: cfg.catalog_refresh_secs,
            fuzzy_max_distance: cfg.fuzzy_max_distance,
        },
    ));
    let guard = Arc::new(RateGuard::new());
    let locks = Arc::new(KeyedLocks::new());

    let broker = Arc::new(Broker::new(
        cfg.clone(),
        store.clone(),
        resolver.clone(),
        guard.clone(),
        locks.clone(),
    )?);
    let auctions = Arc::new(AuctionHouse::new(
        cfg.clone(),
        store,
        resolver,
        guard,
        locks,
    ));

    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("catalog", v_str(&format!("{:?}", kind))),
            ("sqlite", v_str(&cfg.sqlite_path)),
            ("sweep_interval_secs", v_num(cfg.sweep_interval_secs as f64)),
        ]),
    );

    // Periodic sweep: end expired auctions and default-deny high-risk
    // trades whose approval window elapsed. The request surface itself is
    // driven by the surrounding command layer, which holds the broker and
    // auction handles.
    loop {
        let now = now_ts();
        match auctions.sweep_expired(now).await {
            Ok(ended) if ended > 0 => log(
                Level::Info,
                Domain::System,
                "sweep_auctions",
                obj(&[("ended", v_num(ended as f64))]),
            ),
            Ok(_) => {}
            Err(e) => log(
                Level::Error,
                Domain::System,
                "sweep_auctions_failed",
                obj(&[("error", v_str(&e.to_string()))]),
            ),
        }
        match broker.expire_overdue_risk_checks(now).await {
            Ok(expired) if expired > 0 => log(
                Level::Info,
                Domain::System,
                "sweep_risk_checks",
                obj(&[("expired", v_num(expired as f64))]),
            ),
            Ok(_) => {}
            Err(e) => log(
                Level::Error,
                Domain::System,
                "sweep_risk_checks_failed",
                obj(&[("error", v_str(&e.to_string()))]),
            ),
        }
        sleep(Duration::from_secs(cfg.sweep_interval_secs)).await;
    }
}
