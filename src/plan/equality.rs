// src/plan/equality.rs

//! Structural descriptor equality.
//!
//! Two descriptors are equal iff a canonical walk over their fields emits
//! the same byte sequence. The walk length-prefixes every scalar, keeps
//! sequences in declared order, and visits map keys sorted, so the result
//! does not depend on how any particular run serialized its maps.

use serde_json::Value;

use crate::job::JobSpec;

/// Deterministic byte encoding of a descriptor.
pub fn canonical_bytes(spec: &JobSpec) -> Vec<u8> {
    let mut out = Vec::new();
    put_str(&mut out, &spec.command);
    put_path_seq(&mut out, &spec.files_in);
    put_path_seq(&mut out, &spec.files_out);
    put_path_seq(&mut out, &spec.files_clean);
    put_value(&mut out, &spec.opt);
    out
}

/// Structural equality of two descriptors.
pub fn specs_equal(a: &JobSpec, b: &JobSpec) -> bool {
    canonical_bytes(a) == canonical_bytes(b)
}

fn put_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(&(len as u64).to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    out.push(b's');
    put_len(out, s.len());
    out.extend_from_slice(s.as_bytes());
}

fn put_path_seq(out: &mut Vec<u8>, paths: &[std::path::PathBuf]) {
    out.push(b'p');
    put_len(out, paths.len());
    for path in paths {
        put_str(out, &path.to_string_lossy());
    }
}

fn put_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.push(b'n'),
        Value::Bool(b) => {
            out.push(b'b');
            out.push(*b as u8);
        }
        Value::Number(n) => {
            out.push(b'd');
            put_str(out, &n.to_string());
        }
        Value::String(s) => put_str(out, s),
        Value::Array(items) => {
            out.push(b'a');
            put_len(out, items.len());
            for item in items {
                put_value(out, item);
            }
        }
        Value::Object(map) => {
            out.push(b'o');
            put_len(out, map.len());
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for key in keys {
                put_str(out, key);
                put_value(out, &map[key]);
            }
        }
    }
}
