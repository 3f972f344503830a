/// Trace one step of a cluster's chain search
///
/// Messages for the cluster selected with `--verbose-cluster` are written to stderr with a
/// cluster prefix, regardless of log level. For all other clusters the message is a debug log
/// entry, formatted only when debug logging is enabled.
///
/// # Examples
///
/// ```
/// cluster_msg!(verbose, cluster.id, "adding {:?}", link);
/// ```
macro_rules! cluster_msg {
    ($verbose:expr, $cluster_id:expr, $($arg:tt)+) => {
        if $verbose {
            eprintln!("[cluster {}] {}", $cluster_id, format_args!($($arg)+));
        } else if log::log_enabled!(log::Level::Debug) {
            log::debug!("cluster({}) {}", $cluster_id, format_args!($($arg)+));
        }
    };
}

pub(crate) use cluster_msg;
