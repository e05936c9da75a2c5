use std::sync::Once;

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

static INIT: Once = Once::new();

/// Installs the global subscriber. `RUST_LOG` sets the filter; each `-v`
/// raises this crate's own level (debug, then trace) on top of it.
pub fn init(verbosity: u8) {
    INIT.call_once(|| {
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        for directive in extra_directives(verbosity) {
            if let Ok(directive) = directive.parse::<Directive>() {
                filter = filter.add_directive(directive);
            }
        }
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_level(true)
            .try_init();
    });
}

/// Directives layered over the environment filter. Without `-v` only the
/// HTTP stack is quieted, so `RUST_LOG` alone decides this crate's level.
fn extra_directives(verbosity: u8) -> Vec<String> {
    let mut directives = vec!["hyper=warn".to_string(), "reqwest=warn".to_string()];
    let level = match verbosity {
        0 => return directives,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    directives.push(format!("rust_eink_frame={level}"));
    directives.push(format!("eink_frame={level}"));
    directives
}

#[cfg(test)]
mod tests {
    use super::extra_directives;

    #[test]
    fn quiet_run_leaves_crate_level_to_rust_log() {
        let directives = extra_directives(0);
        assert!(directives.iter().all(|d| !d.contains("eink_frame")));
    }

    #[test]
    fn verbose_flags_raise_crate_level() {
        assert!(extra_directives(1).contains(&"rust_eink_frame=DEBUG".to_string()));
        assert!(extra_directives(3).contains(&"eink_frame=TRACE".to_string()));
    }
}
