//! Environment variable overlay, modeled on the prefixed env-loader pattern:
//! `FLEETLB_PORT`, `FLEETLB_API_KEYS` (comma-separated), etc.

use std::env;

pub struct EnvConfigLoader {
    prefix: String,
}

impl EnvConfigLoader {
    pub fn new(prefix: &str) -> Self {
        Self { prefix: prefix.to_string() }
    }

    fn var_name(&self, field: &str) -> String {
        format!("{}_{}", self.prefix, field.to_uppercase())
    }

    pub fn get_string(&self, field: &str) -> Option<String> {
        env::var(self.var_name(field)).ok()
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get_string(field).and_then(|v| match v.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
    }

    pub fn get_u16(&self, field: &str) -> Option<u16> {
        self.get_string(field).and_then(|v| v.parse().ok())
    }

    pub fn get_u32(&self, field: &str) -> Option<u32> {
        self.get_string(field).and_then(|v| v.parse().ok())
    }

    pub fn get_u64(&self, field: &str) -> Option<u64> {
        self.get_string(field).and_then(|v| v.parse().ok())
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get_string(field).and_then(|v| v.parse().ok())
    }

    pub fn get_usize(&self, field: &str) -> Option<usize> {
        self.get_string(field).and_then(|v| v.parse().ok())
    }

    pub fn get_list(&self, field: &str) -> Option<Vec<String>> {
        self.get_string(field).map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }
}
