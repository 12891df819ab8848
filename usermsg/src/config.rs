//! Zenoh session defaults for user message dispatch.

use serde::Serialize;
use serde_json::Value;

#[derive(Serialize, Clone, Debug)]
pub struct ConfigOverride {
    pub key: &'static str,
    pub value: Value,
    pub reason: &'static str,
}

// SESSION CONFIG - applied before any user or environment override
pub fn session_overrides() -> Vec<ConfigOverride> {
    vec![
        ConfigOverride {
            key: "mode",
            value: serde_json::json!("peer"),
            reason: "Game servers and listeners talk peer to peer by default",
        },
        ConfigOverride {
            key: "timestamping/enabled",
            value: serde_json::json!({"router": true, "peer": true, "client": true}),
            reason: "Listeners order user messages by source timestamp",
        },
        ConfigOverride {
            key: "transport/unicast/open_timeout",
            value: serde_json::json!(10000),
            reason: "A dispatcher should fail fast when no peer is reachable",
        },
        ConfigOverride {
            key: "transport/link/tx/queue/congestion_control/block/wait_before_close",
            value: serde_json::json!(5000000),
            reason: "Reliable user messages block at most five seconds on a congested link",
        },
        ConfigOverride {
            key: "transport/shared_memory/enabled",
            value: serde_json::json!(false),
            reason: "Payloads are a few hundred bytes, shared memory buys nothing",
        },
    ]
}

/// Render overrides as a commented JSON5 document.
pub fn generate_json5(overrides: &[ConfigOverride], name: &str) -> String {
    let mut output = format!("// GENERATED: {}\n", name);
    output.push_str("{\n");

    for (i, override_) in overrides.iter().enumerate() {
        output.push_str(&format!("  // {}\n", override_.reason));
        output.push_str(&format!("  \"{}\": ", override_.key));
        let value_str = serde_json::to_string_pretty(&override_.value)
            .unwrap_or_else(|_| "null".to_string())
            .replace('\n', "\n  ");
        output.push_str(&value_str);
        output.push_str(if i < overrides.len() - 1 { ",\n\n" } else { "\n" });
    }

    output.push_str("}\n");
    output
}

/// Apply a set of overrides on top of `config`.
pub fn apply_overrides(
    config: &mut zenoh::Config,
    overrides: &[ConfigOverride],
) -> zenoh::Result<()> {
    for override_ in overrides {
        let value_str = serde_json::to_string(&override_.value)?;
        config.insert_json5(override_.key, &value_str)?;
    }
    Ok(())
}

/// Create the default dispatcher session configuration.
pub fn session_config() -> zenoh::Result<zenoh::Config> {
    let mut config = zenoh::Config::default();
    apply_overrides(&mut config, &session_overrides())?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config() {
        let config = session_config().expect("Failed to build session config");
        assert_eq!(config.mode().unwrap().to_string(), "peer");
    }

    #[test]
    fn test_generate_json5_session() {
        let json5 = generate_json5(&session_overrides(), "usermsg session");
        assert!(json5.contains("GENERATED"));
        assert!(json5.contains("\"mode\": \"peer\""));
        let parsed: serde_json::Value = json5::from_str(&json5).unwrap();
        assert_eq!(parsed["mode"], "peer");
    }
}
