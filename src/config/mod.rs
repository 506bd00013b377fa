// src/config/mod.rs
// Configuration module

mod env;

pub use env::{
    CacheConfig, DEFAULT_NOTION_MCP_URL, DEFAULT_OFFICIAL_MCP_URL, DEFAULT_STDIO_ARGS_PREFIX,
    DEFAULT_STDIO_COMMAND, EnvConfig, OfficialMcpConfig, Transport,
};
