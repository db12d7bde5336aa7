use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;

pub fn verbosity_to_level_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Logs go to stderr so that stdout only carries the run summary.
pub fn setup_logger(level: LevelFilter, json: bool) -> Box<dyn Subscriber + Send + Sync> {
    let builder = tracing_subscriber
        ::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.finish())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_verbosity() {
        assert_eq!(verbosity_to_level_filter(0), LevelFilter::INFO);
        assert_eq!(verbosity_to_level_filter(1), LevelFilter::DEBUG);
        assert_eq!(verbosity_to_level_filter(2), LevelFilter::TRACE);
        assert_eq!(verbosity_to_level_filter(9), LevelFilter::TRACE);
    }
}
