use parking_lot::Once;

/// Resolve the broker address for integration tests, or `None` when the
/// `TEST_INTEGRATION` opt-in is absent.
///
/// Panics when `TEST_INTEGRATION` is set without `KAFKA_CONNECT`, so a CI
/// job that asks for integration coverage cannot silently skip it.
pub fn kafka_connect_from_env() -> Option<String> {
    dotenv::dotenv().ok();

    if std::env::var("TEST_INTEGRATION").is_err() {
        eprintln!("skipping integration tests - set TEST_INTEGRATION to run");
        return None;
    }

    match std::env::var("KAFKA_CONNECT") {
        Ok(connect) => Some(connect),
        Err(_) => panic!(
            "TEST_INTEGRATION is set but KAFKA_CONNECT is not; start Kafka or Redpanda and \
            set KAFKA_CONNECT to its bootstrap address"
        ),
    }
}

/// Early-returns from the calling test unless integration testing is opted
/// in; otherwise yields the bootstrap address.
#[macro_export]
macro_rules! maybe_skip_integration {
    () => {
        match $crate::test_helpers::kafka_connect_from_env() {
            Some(connect) => connect,
            None => return,
        }
    };
}

/// Topic names are unique per invocation, so repeated runs against the same
/// cluster never collide.
pub fn unique_topic(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

static INIT_LOGGING: Once = Once::new();

/// Route `tracing` (and `log`) output to the test writer when `RUST_LOG` is
/// set; does nothing otherwise.
pub fn maybe_start_logging() {
    use tracing_log::LogTracer;
    use tracing_subscriber::{filter::EnvFilter, FmtSubscriber};

    if std::env::var("RUST_LOG").is_err() {
        return;
    }

    INIT_LOGGING.call_once(|| {
        LogTracer::init().expect("install log forwarder");

        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("install tracing subscriber");
    });
}
