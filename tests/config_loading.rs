use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use marketplace_guard::config::{load_config, ConfigError, RoutePolicy};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Scratch config file, removed on drop.
struct ConfigFile(PathBuf);

impl ConfigFile {
    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ConfigFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn write_config(contents: &str) -> ConfigFile {
    let path = std::env::temp_dir().join(format!(
        "guard-config-{}-{}.toml",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(&path, contents).unwrap();
    ConfigFile(path)
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"
        [listener]
        bind_address = "127.0.0.1:9000"

        [security]
        production = true

        [rate_limit]
        window_secs = 120
        privileged_per_window = 200
        authenticated_per_window = 60
        anonymous_per_window = 20
        trust_forwarded_for = false

        [csrf]
        header_names = ["x-csrf-token"]

        [[csrf.routes]]
        path_prefix = "/api/webhooks"
        policy = "exempt"

        [auth_monitor]
        rollup_interval_secs = 600

        [admin]
        enabled = true
        api_key = "a-real-secret"
        "#,
    );

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
    assert!(config.security.production);
    assert_eq!(config.rate_limit.window_secs, 120);
    assert_eq!(config.rate_limit.privileged_per_window, 200);
    assert!(!config.rate_limit.trust_forwarded_for);
    assert_eq!(config.csrf.header_names, vec!["x-csrf-token".to_string()]);
    assert_eq!(config.csrf.routes.len(), 1);
    assert_eq!(config.csrf.routes[0].policy, RoutePolicy::Exempt);
    assert_eq!(config.auth_monitor.rollup_interval_secs, 600);
    assert_eq!(config.session.cookie_name, "sid");
}

#[test]
fn test_invalid_config_lists_every_problem() {
    let file = write_config(
        r#"
        [rate_limit]
        privileged_per_window = 0

        [csrf]
        header_names = []

        [admin]
        enabled = true
        "#,
    );

    match load_config(file.path()) {
        Err(ConfigError::Validation(errors)) => {
            let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
            assert!(fields.contains(&"rate_limit.privileged_per_window"));
            assert!(fields.contains(&"rate_limit"));
            assert!(fields.contains(&"csrf.header_names"));
            assert!(fields.contains(&"admin.api_key"));
        }
        other => panic!("expected validation errors, got {:?}", other.map(|_| ())),
    }
}
