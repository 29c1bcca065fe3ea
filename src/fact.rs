//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 内置请求事实
//!
//! [`WebRequest`] 是规则求值的请求表示，由宿主在每个请求上构建。
//!
//! # 字段
//!
//! | 成员 | 类型 |
//! |------|------|
//! | `Method` / `Path` / `QueryString` / `Referer` / `UserAgent` / `RemoteIp` | String |
//! | `Authenticated` | Bool |
//! | `Headers` / `Query` | Map<String, String> |
//! | `Timestamp` | Time |
//!
//! # 方法
//!
//! `IsInIpList(list)`、`IsNotInIpList(list)`、`ContainsUserAgent(keywords)`、
//! `IsInUserAgentList(list)`、`UserAgentStartsWith(prefixes)`、`UserAgentMatches(pattern)`、
//! `UserAgentIsEmpty()`、`InSubnet(ip, prefix)`、`IpInFile(path)`

use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::matchers::{user_agent, Matchers};
use crate::schema::{Fact, FactSchema, MethodEnv};
use crate::value::{Value, ValueType};

const USER_AGENT_HEADER: &str = "user-agent";
const REFERER_HEADER: &str = "referer";

/// 请求事实
#[derive(Clone)]
pub struct WebRequest {
    method: String,
    path: String,
    query_string: Option<String>,
    remote_ip: Option<String>,
    authenticated: bool,
    /// 键为小写头名称
    headers: Arc<HashMap<String, Value>>,
    query: Arc<HashMap<String, Value>>,
    timestamp: DateTime<Utc>,
}

impl std::fmt::Debug for WebRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 脱敏 headers
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| {
                let v = if k.contains("auth") || k.contains("cookie") || k.contains("key") {
                    "***"
                } else {
                    v.as_str().unwrap_or("")
                };
                (k.as_str(), v)
            })
            .collect();

        f.debug_struct("WebRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("remote_ip", &self.remote_ip)
            .field("authenticated", &self.authenticated)
            .field("headers", &headers)
            .field("query_keys", &self.query.keys().collect::<Vec<_>>())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl Default for WebRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl WebRequest {
    /// 创建空请求（`GET /`）
    pub fn new() -> Self {
        Self {
            method: "GET".to_string(),
            path: "/".to_string(),
            query_string: None,
            remote_ip: None,
            authenticated: false,
            headers: Arc::new(HashMap::new()),
            query: Arc::new(HashMap::new()),
            timestamp: Utc::now(),
        }
    }

    /// 设置请求方法
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// 设置请求路径
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// 设置查询字符串，同时解析 `Query` 参数
    pub fn with_query_string(mut self, query_string: impl Into<String>) -> Self {
        let query_string = query_string.into();
        let params = Arc::make_mut(&mut self.query);
        // 参数名和值按 application/x-www-form-urlencoded 解码
        for (key, value) in form_urlencoded::parse(query_string.trim_start_matches('?').as_bytes()) {
            params.insert(key.into_owned(), Value::from(value.as_ref()));
        }
        self.query_string = Some(query_string);
        self
    }

    /// 设置单个查询参数
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.query).insert(key.into(), Value::Str(value.into()));
        self
    }

    /// 设置远程IP
    pub fn with_remote_ip(mut self, ip: impl Into<String>) -> Self {
        self.remote_ip = Some(ip.into());
        self
    }

    pub fn with_authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }

    /// 添加HTTP头（名称不区分大小写）
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.headers)
            .insert(name.as_ref().to_ascii_lowercase(), Value::Str(value.into()));
        self
    }

    pub fn with_user_agent(self, user_agent: impl Into<String>) -> Self {
        self.with_header(USER_AGENT_HEADER, user_agent)
    }

    pub fn with_referer(self, referer: impl Into<String>) -> Self {
        self.with_header(REFERER_HEADER, referer)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    pub fn remote_ip(&self) -> Option<&str> {
        self.remote_ip.as_deref()
    }

    pub fn authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(Value::as_str)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header(USER_AGENT_HEADER)
    }

    pub fn referer(&self) -> Option<&str> {
        self.header(REFERER_HEADER)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn header_value(&self, name: &str) -> Value {
        self.headers.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn is_in_ip_list(&self, matchers: &Matchers, namespace: &str, ip_list: &str) -> bool {
        matchers.ip_in_list(namespace, self.remote_ip(), ip_list)
    }

    pub fn contains_user_agent(&self, matchers: &Matchers, namespace: &str, keywords: &str) -> bool {
        user_agent::contains_any(self.user_agent(), &matchers.ua_list(namespace, keywords))
    }

    pub fn is_in_user_agent_list(&self, matchers: &Matchers, namespace: &str, list: &str) -> bool {
        user_agent::is_in_list(self.user_agent(), &matchers.ua_list(namespace, list))
    }

    pub fn user_agent_starts_with(&self, matchers: &Matchers, namespace: &str, prefixes: &str) -> bool {
        user_agent::starts_with_any(self.user_agent(), &matchers.ua_list(namespace, prefixes))
    }

    /// 远程IP是否位于 `ip/prefix` 子网内
    pub fn in_subnet(&self, ip: &str, prefix: i64) -> bool {
        Matchers::in_subnet(self.remote_ip(), ip, prefix)
    }
}

fn str_arg(args: &[Value]) -> &str {
    args.first().and_then(Value::as_str).unwrap_or("")
}

impl Fact for WebRequest {
    fn schema() -> FactSchema<Self> {
        let string_map = ValueType::map_of(ValueType::Str);
        FactSchema::new("WebRequest")
            .field("Method", ValueType::Str, |r: &WebRequest| {
                Value::from(r.method.as_str())
            })
            .field("Path", ValueType::Str, |r: &WebRequest| {
                Value::from(r.path.as_str())
            })
            .field("QueryString", ValueType::Str, |r: &WebRequest| {
                Value::from(r.query_string.clone())
            })
            .field("Referer", ValueType::Str, |r: &WebRequest| {
                r.header_value(REFERER_HEADER)
            })
            .field("UserAgent", ValueType::Str, |r: &WebRequest| {
                r.header_value(USER_AGENT_HEADER)
            })
            .field("RemoteIp", ValueType::Str, |r: &WebRequest| {
                Value::from(r.remote_ip.clone())
            })
            .field("Authenticated", ValueType::Bool, |r: &WebRequest| {
                Value::Bool(r.authenticated)
            })
            .field("Headers", string_map.clone(), |r: &WebRequest| {
                Value::Map(Arc::clone(&r.headers))
            })
            .field("Query", string_map, |r: &WebRequest| {
                Value::Map(Arc::clone(&r.query))
            })
            .field("Timestamp", ValueType::Time, |r: &WebRequest| {
                Value::Time(r.timestamp)
            })
            .method(
                "IsInIpList",
                vec![ValueType::Str],
                |r: &WebRequest, env: &MethodEnv<'_>, args: &[Value]| {
                    r.is_in_ip_list(env.matchers, env.rule_id, str_arg(args))
                },
            )
            .method(
                "IsNotInIpList",
                vec![ValueType::Str],
                |r: &WebRequest, env: &MethodEnv<'_>, args: &[Value]| {
                    !r.is_in_ip_list(env.matchers, env.rule_id, str_arg(args))
                },
            )
            .method(
                "ContainsUserAgent",
                vec![ValueType::Str],
                |r: &WebRequest, env: &MethodEnv<'_>, args: &[Value]| {
                    r.contains_user_agent(env.matchers, env.rule_id, str_arg(args))
                },
            )
            .method(
                "IsInUserAgentList",
                vec![ValueType::Str],
                |r: &WebRequest, env: &MethodEnv<'_>, args: &[Value]| {
                    r.is_in_user_agent_list(env.matchers, env.rule_id, str_arg(args))
                },
            )
            .method(
                "UserAgentStartsWith",
                vec![ValueType::Str],
                |r: &WebRequest, env: &MethodEnv<'_>, args: &[Value]| {
                    r.user_agent_starts_with(env.matchers, env.rule_id, str_arg(args))
                },
            )
            .pattern_method(
                "UserAgentMatches",
                vec![ValueType::Str],
                0,
                |r: &WebRequest, env: &MethodEnv<'_>, args: &[Value]| {
                    env.matchers
                        .ua_matches(env.rule_id, r.user_agent(), str_arg(args))
                },
            )
            .method(
                "UserAgentIsEmpty",
                vec![],
                |r: &WebRequest, _env: &MethodEnv<'_>, _args: &[Value]| {
                    user_agent::is_empty(r.user_agent())
                },
            )
            .method(
                "InSubnet",
                vec![ValueType::Str, ValueType::Int],
                |r: &WebRequest, _env: &MethodEnv<'_>, args: &[Value]| {
                    let prefix = args.get(1).and_then(Value::as_i64).unwrap_or(-1);
                    r.in_subnet(str_arg(args), prefix)
                },
            )
            .method(
                "IpInFile",
                vec![ValueType::Str],
                |r: &WebRequest, env: &MethodEnv<'_>, args: &[Value]| {
                    env.matchers
                        .ip_in_file(env.rule_id, r.remote_ip(), str_arg(args))
                },
            )
    }
}

/// 引擎做速率计数和拦截记录时需要的请求信息
pub trait RequestFact: Fact {
    /// 客户端地址，未知时为 `None`
    fn client_ip(&self) -> Option<&str>;

    fn request_path(&self) -> &str;
}

impl RequestFact for WebRequest {
    fn client_ip(&self) -> Option<&str> {
        self.remote_ip()
    }

    fn request_path(&self) -> &str {
        self.path()
    }
}
