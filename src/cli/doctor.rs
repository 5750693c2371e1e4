use crate::config::{Config, ProviderSettings, load_config};
use crate::providers::Provider;
use crate::providers::client::ProviderClient;
use crate::providers::facebook::FacebookClient;
use crate::providers::instagram::InstagramClient;
use anyhow::Result;
use std::path::Path;
use tracing::debug;

#[derive(Debug)]
enum CheckResult {
    Pass(String),
    Fail(String),
    Skip(String),
}

impl CheckResult {
    fn label(&self) -> &'static str {
        match self {
            Self::Pass(_) => "PASS",
            Self::Fail(_) => "FAIL",
            Self::Skip(_) => "SKIP",
        }
    }

    fn detail(&self) -> &str {
        match self {
            Self::Pass(s) | Self::Fail(s) | Self::Skip(s) => s,
        }
    }
}

fn print_check(name: &str, result: &CheckResult) {
    println!("  {:<6} {:<30} {}", result.label(), name, result.detail());
}

fn check_config_exists(config_path: Option<&Path>) -> CheckResult {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => match crate::config::get_config_path() {
            Ok(p) => p,
            Err(e) => return CheckResult::Fail(format!("cannot determine path: {}", e)),
        },
    };
    if path.exists() {
        CheckResult::Pass(format!("{}", path.display()))
    } else {
        CheckResult::Skip(format!("not found at {} (defaults apply)", path.display()))
    }
}

fn check_credentials(settings: &ProviderSettings) -> CheckResult {
    if !settings.enabled {
        return CheckResult::Skip("disabled".to_string());
    }
    if settings.access_token.trim().is_empty() {
        return CheckResult::Fail("enabled but access token not set".to_string());
    }
    CheckResult::Pass("enabled, access token configured".to_string())
}

fn check_webhook_auth(settings: &ProviderSettings) -> CheckResult {
    if !settings.enabled {
        return CheckResult::Skip("disabled".to_string());
    }
    if settings.verify_token.is_empty() {
        return CheckResult::Fail(
            "verify token not set, the subscription handshake will fail".to_string(),
        );
    }
    if settings.app_secret.trim().is_empty() {
        return CheckResult::Pass("verify token set, signature check disabled".to_string());
    }
    CheckResult::Pass("verify token and app secret configured".to_string())
}

async fn check_connectivity(provider: Provider, settings: &ProviderSettings) -> CheckResult {
    if !settings.enabled {
        return CheckResult::Skip("disabled".to_string());
    }
    if settings.access_token.trim().is_empty() {
        return CheckResult::Skip("no access token".to_string());
    }

    let client: Box<dyn ProviderClient> = match provider {
        Provider::Instagram => Box::new(InstagramClient::new(settings)),
        Provider::Facebook => Box::new(FacebookClient::new(settings)),
    };

    let start = std::time::Instant::now();
    match client.verify_credentials().await {
        Ok(identity) => {
            let elapsed = start.elapsed();
            CheckResult::Pass(format!(
                "{} ({:.0}ms)",
                identity.name.as_deref().unwrap_or(&identity.id),
                elapsed.as_secs_f64() * 1000.0
            ))
        }
        Err(e) => CheckResult::Fail(format!("{}", e)),
    }
}

fn check_config_file_permissions(config_path: Option<&Path>) -> CheckResult {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => match crate::config::get_config_path() {
            Ok(p) => p,
            Err(_) => return CheckResult::Skip("cannot determine path".to_string()),
        },
    };
    if !path.exists() {
        return CheckResult::Skip("config file not found".to_string());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = std::fs::metadata(&path) {
            let mode = meta.permissions().mode() & 0o777;
            if mode.trailing_zeros() >= 6 {
                CheckResult::Pass(format!("{:o}", mode))
            } else {
                CheckResult::Fail(format!(
                    "{:o} (world/group readable, run: chmod 600 {})",
                    mode,
                    path.display()
                ))
            }
        } else {
            CheckResult::Skip("cannot read metadata".to_string())
        }
    }

    #[cfg(not(unix))]
    CheckResult::Skip("permission check not available on this platform".to_string())
}

pub(super) async fn doctor_command(config_path: Option<&Path>) -> Result<()> {
    println!("unibox doctor\n");
    println!("{}", "=".repeat(60));

    let mut pass_count = 0u32;
    let mut fail_count = 0u32;
    let mut skip_count = 0u32;

    let mut record = |name: &str, result: &CheckResult| {
        print_check(name, result);
        match result {
            CheckResult::Pass(_) => pass_count += 1,
            CheckResult::Fail(_) => fail_count += 1,
            CheckResult::Skip(_) => skip_count += 1,
        }
    };

    println!("\n  Core");
    println!("  {}", "-".repeat(56));

    let r = check_config_exists(config_path);
    record("Config file", &r);

    let parsed = load_config(config_path);
    let r = match &parsed {
        Ok(_) => CheckResult::Pass("valid JSON".to_string()),
        Err(e) => CheckResult::Fail(format!("{}", e)),
    };
    record("Config parses", &r);
    let config: Option<Config> = parsed.ok();

    println!("\n  Providers");
    println!("  {}", "-".repeat(56));

    for provider in Provider::all() {
        let r = match &config {
            Some(config) => check_credentials(config.providers.get(provider)),
            None => CheckResult::Skip("config did not parse".to_string()),
        };
        record(provider.as_str(), &r);
    }

    println!("\n  Connectivity");
    println!("  {}", "-".repeat(56));

    for provider in Provider::all() {
        let r = match &config {
            Some(config) => {
                debug!("checking {} connectivity...", provider);
                check_connectivity(provider, config.providers.get(provider)).await
            }
            None => CheckResult::Skip("config did not parse".to_string()),
        };
        record(provider.as_str(), &r);
    }

    println!("\n  Webhooks");
    println!("  {}", "-".repeat(56));

    for provider in Provider::all() {
        let r = match &config {
            Some(config) => check_webhook_auth(config.providers.get(provider)),
            None => CheckResult::Skip("config did not parse".to_string()),
        };
        record(provider.as_str(), &r);
    }

    println!("\n  Security");
    println!("  {}", "-".repeat(56));

    let r = check_config_file_permissions(config_path);
    record("Config file permissions", &r);

    println!("\n{}", "=".repeat(60));
    println!(
        "  {} passed, {} failed, {} skipped",
        pass_count, fail_count, skip_count
    );

    if fail_count > 0 {
        println!("\n  Some checks failed. Review the output above.");
    } else {
        println!("\n  All checks passed!");
    }

    if config.is_none() {
        anyhow::bail!("config did not parse");
    }

    Ok(())
}
