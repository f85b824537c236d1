/// Install the stderr subscriber.
///
/// WARN by default, INFO with `-v`, DEBUG with `-vv` and above. Colors are
/// only used when stderr is a terminal. Safe to call more than once.
pub fn init(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };

    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_writer(std::io::stderr)
        .try_init();
}
