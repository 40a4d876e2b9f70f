//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息

use config::{Config, ConfigError, Environment};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址，例如 "0.0.0.0:3000"
    pub addr: String,
    /// 优雅关闭超时时间（秒）
    pub graceful_shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库连接 URL；未设置时使用内存存储
    pub url: Option<Secret<String>>,
    /// 最大连接数
    pub max_connections: u32,
    /// 最小连接数
    pub min_connections: u32,
    /// 获取连接超时时间（秒）
    pub acquire_timeout_secs: u64,
    /// 空闲连接超时时间（秒）
    pub idle_timeout_secs: u64,
    /// 连接最大生命周期（秒）
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// JWT 密钥（使用 Secret 包装，防止日志泄露）
    pub jwt_secret: Secret<String>,
    /// 访问令牌过期时间（秒）
    pub access_token_exp_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthzConfig {
    /// 未分配角色的用户使用的角色（最低权限）
    pub fallback_role: String,
    /// 内置管理员角色，初始化时授予全部权限
    pub admin_role: String,
    /// 管理角色与权限所需的权限键
    pub manage_permission: String,
    /// 关键权限：只有 critical_editors 中的角色可以增删
    pub critical_permissions: Vec<String>,
    /// 允许修改关键权限的角色
    pub critical_editors: Vec<String>,
    /// 权限目录缓存有效期（秒），0 表示每次都从存储读取
    pub catalog_cache_ttl_secs: u64,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            fallback_role: "user".to_string(),
            admin_role: "admin".to_string(),
            manage_permission: "permissions.manage".to_string(),
            critical_permissions: vec![
                "permissions.manage".to_string(),
                "users.manage".to_string(),
            ],
            critical_editors: vec!["admin".to_string()],
            catalog_cache_ttl_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub authz: AuthzConfig,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("server.addr", "0.0.0.0:3000")?
            .set_default("server.graceful_shutdown_timeout_secs", 30)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.idle_timeout_secs", 600)?
            .set_default("database.max_lifetime_secs", 1800)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("security.jwt_secret", "change-this-secret-in-production-min-32-chars!")?
            .set_default("security.access_token_exp_secs", 900)?
            .set_default("authz.fallback_role", "user")?
            .set_default("authz.admin_role", "admin")?
            .set_default("authz.manage_permission", "permissions.manage")?
            .set_default(
                "authz.critical_permissions",
                vec!["permissions.manage", "users.manage"],
            )?
            .set_default("authz.critical_editors", vec!["admin"])?
            .set_default("authz.catalog_cache_ttl_secs", 60)?;

        // 从环境变量加载配置（前缀为 COACH_），列表使用逗号分隔
        settings = settings.add_source(
            Environment::with_prefix("COACH")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("authz.critical_permissions")
                .with_list_parse_key("authz.critical_editors")
                .try_parsing(true),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 验证端口范围
        if let Some(port_str) = self.server.addr.split(':').next_back() {
            if let Ok(port) = port_str.parse::<u16>() {
                if port != 0 && port < 1024 {
                    return Err(ConfigError::Message("Server port should be >= 1024".to_string()));
                }
            }
        }

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
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        // 验证数据库连接池配置
        if self.database.max_connections < self.database.min_connections {
            return Err(ConfigError::Message(
                "max_connections must be >= min_connections".to_string(),
            ));
        }

        // 验证 JWT 密钥长度（至少 32 字符）
        if self.security.jwt_secret.expose_secret().len() < 32 {
            return Err(ConfigError::Message(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        // 验证令牌过期时间
        if self.security.access_token_exp_secs < 60 || self.security.access_token_exp_secs > 86400 {
            return Err(ConfigError::Message(
                "access_token_exp_secs must be between 60 and 86400 (1 minute to 24 hours)"
                    .to_string(),
            ));
        }

        // 验证授权配置
        let authz = &self.authz;
        if authz.fallback_role.trim().is_empty()
            || authz.admin_role.trim().is_empty()
            || authz.manage_permission.trim().is_empty()
        {
            return Err(ConfigError::Message(
                "authz.fallback_role, authz.admin_role and authz.manage_permission must be set"
                    .to_string(),
            ));
        }

        if authz.fallback_role == authz.admin_role {
            return Err(ConfigError::Message(
                "authz.fallback_role must differ from authz.admin_role".to_string(),
            ));
        }

        // 管理员不在白名单内会导致关键权限无人可改
        if !authz.critical_permissions.is_empty()
            && !authz.critical_editors.contains(&authz.admin_role)
        {
            return Err(ConfigError::Message(format!(
                "authz.critical_editors must include the admin role '{}'",
                authz.admin_role
            )));
        }

        Ok(())
    }
}
