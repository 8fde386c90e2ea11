//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息

use config::{Config, ConfigError, Environment};
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::collections::HashMap;

use common::{AppError, ConnectionParameters, HostKeyVerification, RunnerOptions, ServerGroup};

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty, text
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SshSettings {
    /// TCP 连接超时（秒）
    pub connect_timeout_secs: u64,
    /// 握手超时（秒）
    pub handshake_timeout_secs: u64,
    /// 主机密钥验证策略
    pub host_key_verification: HostKeyVerification,
    /// 已知主机指纹，键为 `host:port`
    #[serde(default)]
    pub known_hosts: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub ssh: SshSettings,
    pub runner: RunnerOptions,
    /// 凭据组，键为组名
    #[serde(default)]
    pub groups: HashMap<String, ServerGroup>,
}

impl AppConfig {
    /// 加载配置，失败映射为 `AppError::Config`
    pub fn load() -> common::Result<Self> {
        Self::from_env().map_err(|e| AppError::Config(e.to_string()))
    }

    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = RunnerOptions::default();
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("logging.level", "info")?
            .set_default("logging.format", "text")?
            .set_default("ssh.connect_timeout_secs", 10)?
            .set_default("ssh.handshake_timeout_secs", 10)?
            .set_default("ssh.host_key_verification", "strict")?
            .set_default(
                "runner.channel_ready_timeout_secs",
                defaults.channel_ready_timeout_secs as i64,
            )?
            .set_default("runner.idle_timeout_secs", defaults.idle_timeout_secs as i64)?
            .set_default(
                "runner.command_timeout_secs",
                defaults.command_timeout_secs as i64,
            )?
            .set_default("runner.chunk_size", defaults.chunk_size as i64)?
            .set_default("runner.remote_file_mode", i64::from(defaults.remote_file_mode))?
            .set_default("runner.profile_prologue", defaults.profile_prologue)?;

        // 从环境变量加载配置（前缀为 GSSH_）
        settings = settings.add_source(
            Environment::with_prefix("GSSH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = settings.build()?.try_deserialize()?;

        for (name, group) in config.groups.iter_mut() {
            if group.name.is_empty() {
                group.name = name.clone();
            }
        }

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "text" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty, text",
                    self.logging.format
                )))
            }
        }

        if self.ssh.connect_timeout_secs == 0 || self.ssh.handshake_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "ssh connect and handshake timeouts must be positive".to_string(),
            ));
        }

        self.runner.validate().map_err(ConfigError::Message)?;

        for (name, group) in &self.groups {
            if group.username.trim().is_empty() {
                return Err(ConfigError::Message(format!(
                    "group {} has an empty username",
                    name
                )));
            }
            if group.port == 0 {
                return Err(ConfigError::Message(format!("group {} has port 0", name)));
            }
            if group.password.expose_secret().is_empty() {
                tracing::warn!(group = %name, "Server group has an empty password");
            }
        }

        Ok(())
    }

    /// 按名称查找凭据组
    pub fn group(&self, name: &str) -> Result<&ServerGroup, ConfigError> {
        self.groups
            .get(name)
            .ok_or_else(|| ConfigError::NotFound(format!("groups.{}", name)))
    }

    /// 把 ssh 配置（超时、主机密钥策略、已知指纹）应用到连接参数
    pub fn connection_for(&self, params: ConnectionParameters) -> ConnectionParameters {
        let params = params
            .with_connect_timeout(self.ssh.connect_timeout_secs)
            .with_handshake_timeout(self.ssh.handshake_timeout_secs)
            .with_host_key_verification(self.ssh.host_key_verification.clone());

        match self.ssh.known_hosts.get(&params.host_key()) {
            Some(fingerprint) => {
                let fingerprint = fingerprint.clone();
                params.with_known_host(&fingerprint)
            }
            None => params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "GSSH_LOGGING__LEVEL",
        "GSSH_LOGGING__FORMAT",
        "GSSH_SSH__HOST_KEY_VERIFICATION",
        "GSSH_RUNNER__CHUNK_SIZE",
        "GSSH_RUNNER__IDLE_TIMEOUT_SECS",
        "GSSH_GROUPS__PROD__PORT",
        "GSSH_GROUPS__PROD__USERNAME",
        "GSSH_GROUPS__PROD__PASSWORD",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env();

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
        assert_eq!(config.ssh.connect_timeout_secs, 10);
        assert_eq!(config.ssh.host_key_verification, HostKeyVerification::Strict);
        assert_eq!(config.runner.chunk_size, 2048);
        assert_eq!(config.runner.remote_file_mode, 0o777);
        assert_eq!(config.runner.idle_timeout_secs, 600);
        assert!(config.groups.is_empty());
    }

    #[test]
    #[serial]
    fn test_config_from_env_overrides() {
        clear_env();
        std::env::set_var("GSSH_SSH__HOST_KEY_VERIFICATION", "accept");
        std::env::set_var("GSSH_RUNNER__IDLE_TIMEOUT_SECS", "30");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.ssh.host_key_verification, HostKeyVerification::Accept);
        assert_eq!(config.runner.idle_timeout_secs, 30);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_groups() {
        clear_env();
        std::env::set_var("GSSH_GROUPS__PROD__PORT", "2222");
        std::env::set_var("GSSH_GROUPS__PROD__USERNAME", "deploy");
        std::env::set_var("GSSH_GROUPS__PROD__PASSWORD", "group-pass");

        let config = AppConfig::from_env().unwrap();
        let group = config.group("prod").unwrap();
        assert_eq!(group.name, "prod");
        assert_eq!(group.port, 2222);
        assert_eq!(group.username, "deploy");
        assert_eq!(group.password.expose_secret(), "group-pass");
        assert!(config.group("staging").is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_validation_invalid_log_level() {
        clear_env();
        std::env::set_var("GSSH_LOGGING__LEVEL", "invalid");

        assert!(AppConfig::from_env().is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_maps_to_config_error() {
        clear_env();
        std::env::set_var("GSSH_LOGGING__FORMAT", "xml");

        let err = AppConfig::load().unwrap_err();
        assert!(matches!(err, AppError::Config(ref msg) if msg.contains("Invalid log format")));
        assert_eq!(err.user_message(), "Configuration error");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_validation_invalid_chunk_size() {
        clear_env();
        std::env::set_var("GSSH_RUNNER__CHUNK_SIZE", "0");

        assert!(AppConfig::from_env().is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_connection_for_applies_ssh_settings() {
        clear_env();
        let mut config = AppConfig::from_env().unwrap();
        config.ssh.connect_timeout_secs = 3;
        config.ssh.host_key_verification = HostKeyVerification::Strict;
        config
            .ssh
            .known_hosts
            .insert("10.0.0.5:22".to_string(), "ABCD".to_string());

        let params = config.connection_for(ConnectionParameters::with_password(
            "10.0.0.5", 22, "deploy", "pw",
        ));

        assert_eq!(params.connect_timeout().as_secs(), 3);
        assert_eq!(params.host_key_verification(), &HostKeyVerification::Strict);
        assert_eq!(params.known_fingerprint(), Some("abcd"));
    }
}
