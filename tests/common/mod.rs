use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the `env_logger` backend once per test binary, matching the
/// teacher's `[LEVEL - target] [file:line] message` formatter. Run at the
/// top of any test that wants to see `log` output (`RUST_LOG=debug cargo
/// test -- --nocapture`).
pub fn setup() {
    INIT.call_once(|| {
        use env_logger::Builder;
        use std::io::Write;

        Builder::from_default_env()
            .format_timestamp_secs()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{} - {}] [{}:{}] {}",
                    record.level(),
                    record.target(),
                    record.file().unwrap_or("?"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            })
            .is_test(true)
            .try_init()
            .ok();
    });
}

pub fn tmp_dir(name: &str) -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("latchkv-it-{}-{}", std::process::id(), name));
    let _ = std::fs::remove_dir_all(&p);
    p
}
