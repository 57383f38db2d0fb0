use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Routes the library's build and query logs to stderr as
/// `[HH:MM:SS] LEVEL: msg`, timed from the first call.
///
/// `verbose` shows Info, otherwise only warnings. `RUST_LOG` refines levels
/// per module. Calls after the first keep the installed logger, so tests and
/// embedding programs may call it more than once.
pub fn init_logger(verbose: bool) {
    START_TIME.get_or_init(Instant::now);

    let level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            let elapsed = START_TIME.get_or_init(Instant::now).elapsed();
            let secs = elapsed.as_secs();
            writeln!(
                buf,
                "[{:02}:{:02}:{:02}] {}: {}",
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60,
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_keeps_the_first_logger() {
        init_logger(false);
        init_logger(true);
        assert!(START_TIME.get().is_some());
        log::warn!("logger still accepts records");
    }
}
