//! `nutrid health` — print the local resource snapshot.

use std::sync::Arc;

use nd_domain::config::Config;
use nd_monitor::ResourceMonitor;

/// Exit 0 when healthy, 1 when constrained.
pub fn run(config: &Config) -> i32 {
    let monitor = Arc::new(ResourceMonitor::new(config.monitor.clone(), None));
    let status = monitor.status();

    match serde_json::to_string_pretty(&status) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("failed to serialize status: {e}");
            return 1;
        }
    }

    if status.healthy {
        0
    } else {
        1
    }
}
