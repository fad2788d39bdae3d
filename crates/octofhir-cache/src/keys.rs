//! Logical cache key builders.
//!
//! Keys are relative to the client namespace; [`KvClient`](octofhir_kv::KvClient)
//! adds the prefix. Pattern builders return the prefix that
//! [`CacheManager::delete_by_pattern`](crate::CacheManager::delete_by_pattern)
//! extends with `*`.

/// `entity:{kind}:{id}`
pub fn entity(kind: &str, id: &str) -> String {
    format!("entity:{kind}:{id}")
}

/// Prefix matching every cached entity of `kind`.
pub fn entity_pattern(kind: &str) -> String {
    format!("entity:{kind}:")
}

/// `perm:{user}:{domain}`
pub fn permission(user: &str, domain: &str) -> String {
    format!("perm:{user}:{domain}")
}

/// Prefix matching every cached permission set of `user`.
pub fn permission_pattern(user: &str) -> String {
    format!("perm:{user}:")
}

/// `lock:{resource}`
pub fn lock(resource: &str) -> String {
    format!("lock:{resource}")
}
