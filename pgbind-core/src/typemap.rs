//! Built-in OID table and the per-run type / nullability caches.
//!
//! OID reference: https://github.com/postgres/postgres/blob/master/src/include/catalog/pg_type.dat

use crate::model::TargetType;
use std::collections::HashMap;

/// Well-known PostgreSQL type OIDs.
pub mod oid {
    pub const BOOL: u32 = 16;
    pub const BYTEA: u32 = 17;
    pub const NAME: u32 = 19;

    pub const INT8: u32 = 20; // bigint
    pub const INT2: u32 = 21; // smallint
    pub const INT4: u32 = 23; // integer

    pub const TEXT: u32 = 25;
    pub const VARCHAR: u32 = 1043;
    pub const BPCHAR: u32 = 1042; // blank-padded char

    pub const JSON: u32 = 114;
    pub const JSONB: u32 = 3802;

    pub const FLOAT4: u32 = 700;
    pub const FLOAT8: u32 = 701;
    pub const NUMERIC: u32 = 1700;

    pub const DATE: u32 = 1082;
    pub const TIME: u32 = 1083;
    pub const TIMETZ: u32 = 1266;
    pub const TIMESTAMP: u32 = 1114;
    pub const TIMESTAMPTZ: u32 = 1184;
    pub const INTERVAL: u32 = 1186;

    pub const UUID: u32 = 2950;

    // 1-D array types (element OIDs are unrelated; these are separate entries)
    pub const BOOL_ARRAY: u32 = 1000;
    pub const BYTEA_ARRAY: u32 = 1001;
    pub const INT2_ARRAY: u32 = 1005;
    pub const INT4_ARRAY: u32 = 1007;
    pub const INT8_ARRAY: u32 = 1016;
    pub const TEXT_ARRAY: u32 = 1009;
    pub const VARCHAR_ARRAY: u32 = 1015;
    pub const FLOAT4_ARRAY: u32 = 1021;
    pub const FLOAT8_ARRAY: u32 = 1022;
    pub const NUMERIC_ARRAY: u32 = 1231;
    pub const DATE_ARRAY: u32 = 1182;
    pub const TIMESTAMP_ARRAY: u32 = 1115;
    pub const TIMESTAMPTZ_ARRAY: u32 = 1185;
    pub const UUID_ARRAY: u32 = 2951;
    pub const JSON_ARRAY: u32 = 199;
    pub const JSONB_ARRAY: u32 = 3807;
}

/// Map a well-known OID to its target type. `None` means "ask the catalog".
pub fn builtin(type_oid: u32) -> Option<TargetType> {
    use TargetType::*;
    let ty = match type_oid {
        oid::BOOL => Bool,
        oid::BYTEA => Bytea,
        oid::INT2 => Int16,
        oid::INT4 => Int32,
        oid::INT8 => Int64,
        oid::FLOAT4 => Float32,
        oid::FLOAT8 | oid::NUMERIC => Float64,
        oid::TEXT | oid::VARCHAR | oid::BPCHAR | oid::NAME | oid::INTERVAL => Text,
        oid::JSON | oid::JSONB => Json,
        oid::DATE => Date,
        oid::TIME | oid::TIMETZ => Time,
        oid::TIMESTAMP | oid::TIMESTAMPTZ => Timestamp,
        oid::UUID => Uuid,

        oid::BOOL_ARRAY => Bool.array(),
        oid::BYTEA_ARRAY => Bytea.array(),
        oid::INT2_ARRAY => Int16.array(),
        oid::INT4_ARRAY => Int32.array(),
        oid::INT8_ARRAY => Int64.array(),
        oid::FLOAT4_ARRAY => Float32.array(),
        oid::FLOAT8_ARRAY | oid::NUMERIC_ARRAY => Float64.array(),
        oid::TEXT_ARRAY | oid::VARCHAR_ARRAY => Text.array(),
        oid::DATE_ARRAY => Date.array(),
        oid::TIMESTAMP_ARRAY | oid::TIMESTAMPTZ_ARRAY => Timestamp.array(),
        oid::UUID_ARRAY => Uuid.array(),
        oid::JSON_ARRAY | oid::JSONB_ARRAY => Json.array(),

        _ => return None,
    };
    Some(ty)
}

/// Per-run cache of resolved OIDs, seeded by the static table and extended
/// with enum resolutions as the introspector discovers them.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    resolved: HashMap<u32, TargetType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an OID: runtime cache first, then the static table. `None`
    /// signals the caller to consult the catalog.
    pub fn resolve(&self, type_oid: u32) -> Option<TargetType> {
        if let Some(ty) = self.resolved.get(&type_oid) {
            return Some(ty.clone());
        }
        builtin(type_oid)
    }

    /// Install a catalog-resolved type (an enum, typically).
    pub fn put(&mut self, type_oid: u32, ty: TargetType) {
        self.resolved.insert(type_oid, ty);
    }
}

/// Per-run cache of `pg_attribute.attnotnull`, keyed by
/// `(table_oid, column_attr)`.
#[derive(Debug, Default)]
pub struct NullabilityCache {
    not_null: HashMap<(u32, i16), bool>,
}

impl NullabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, table_oid: u32, column_attr: i16) -> Option<bool> {
        self.not_null.get(&(table_oid, column_attr)).copied()
    }

    pub fn insert(&mut self, table_oid: u32, column_attr: i16, attnotnull: bool) {
        self.not_null.insert((table_oid, column_attr), attnotnull);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_scalars() {
        assert_eq!(builtin(oid::BOOL), Some(TargetType::Bool));
        assert_eq!(builtin(oid::INT4), Some(TargetType::Int32));
        assert_eq!(builtin(oid::NUMERIC), Some(TargetType::Float64));
        assert_eq!(builtin(oid::INTERVAL), Some(TargetType::Text));
        assert_eq!(builtin(oid::TIMESTAMPTZ), Some(TargetType::Timestamp));
    }

    #[test]
    fn builtin_arrays_wrap_their_element() {
        assert_eq!(
            builtin(oid::INT4_ARRAY),
            Some(TargetType::Array(Box::new(TargetType::Int32)))
        );
        assert_eq!(
            builtin(oid::TEXT_ARRAY),
            Some(TargetType::Array(Box::new(TargetType::Text)))
        );
    }

    #[test]
    fn unknown_oid_asks_the_catalog() {
        assert_eq!(builtin(999_999), None);
    }

    #[test]
    fn registry_prefers_runtime_cache() {
        let mut reg = TypeRegistry::new();
        assert_eq!(reg.resolve(oid::INT4), Some(TargetType::Int32));
        assert_eq!(reg.resolve(777_777), None);

        reg.put(
            777_777,
            TargetType::Enum {
                name: "mood".into(),
                variants: vec!["sad".into(), "ok".into(), "happy".into()],
            },
        );
        match reg.resolve(777_777) {
            Some(TargetType::Enum { name, variants }) => {
                assert_eq!(name, "mood");
                assert_eq!(variants, ["sad", "ok", "happy"]);
            }
            other => panic!("expected enum, got {other:?}"),
        }
    }

    #[test]
    fn nullability_cache_round_trip() {
        let mut cache = NullabilityCache::new();
        assert_eq!(cache.lookup(1234, 1), None);
        cache.insert(1234, 1, true);
        cache.insert(1234, 2, false);
        assert_eq!(cache.lookup(1234, 1), Some(true));
        assert_eq!(cache.lookup(1234, 2), Some(false));
    }
}
