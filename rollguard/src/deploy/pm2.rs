//! PM2 command lines
//!
//! All supervisor interaction goes through these builders so the executor,
//! the prober and the recovery actions agree on quoting and flags.

use crate::utils::shell_quote;

/// Process list as JSON
pub fn jlist() -> String {
    "pm2 jlist".to_string()
}

/// The last `lines` log lines of the app, stdout and stderr merged
pub fn logs(app: &str, lines: u32) -> String {
    format!(
        "pm2 logs {} --lines {} --raw --nostream 2>&1",
        shell_quote(app),
        lines
    )
}

/// Disk usage percentage of the filesystem holding `path`
pub fn disk_usage(path: &str) -> String {
    format!(
        "df -Pk \"$(dirname {})\" | awk 'NR==2 {{print $5}}'",
        shell_quote(path)
    )
}

/// Stop the app if it is registered. PM2 sends SIGINT and waits its kill timeout.
pub fn stop(app: &str) -> String {
    let app = shell_quote(app);
    format!(
        "if pm2 describe {app} >/dev/null 2>&1; then pm2 stop {app}; fi",
        app = app
    )
}

/// Restart the app from `path`, registering it on first start, then persist the process list.
///
/// The app's log files are flushed before a restart, so the log window the
/// prober reads only holds output of the new process.
pub fn start_or_restart(app: &str, path: &str, script: &str, interpreter: &str) -> String {
    let flush_logs = flush(app);
    let app = shell_quote(app);
    format!(
        "cd {path} && if pm2 describe {app} >/dev/null 2>&1; then {flush_logs} >/dev/null 2>&1; pm2 restart {app} --update-env; \
         else pm2 start {script} --name {app} --interpreter {interpreter}; fi && pm2 save",
        path = shell_quote(path),
        flush_logs = flush_logs,
        app = app,
        script = shell_quote(script),
        interpreter = shell_quote(interpreter),
    )
}

/// Empty the app's log files
pub fn flush(app: &str) -> String {
    format!("pm2 flush {}", shell_quote(app))
}

/// Empty the log files of every app PM2 supervises
pub fn flush_all() -> String {
    "pm2 flush".to_string()
}

/// Human-readable process description, for diagnostics
pub fn describe(app: &str) -> String {
    format!("pm2 describe {} 2>&1", shell_quote(app))
}
