//! Pattern unification of compound keys.

use crate::schema::key::{is_variable, Bindings, Key, NEGATIVE};

/// Unify `concrete` against `pattern` under `bindings`.
///
/// A wildcard pattern matches anything except the negative atom `no` and
/// leaves the bindings unchanged. Otherwise the arities must agree and each
/// pattern atom must either resolve through the bindings to the concrete atom,
/// be a fresh variable (which gets bound), or equal the concrete atom.
///
/// Returns the extended bindings on success. The caller's bindings are never
/// modified, so one partial binding can seed many candidate branches.
pub fn unify(concrete: &Key, pattern: &Key, bindings: &Bindings) -> Option<Bindings> {
    if pattern.is_wildcard() {
        if concrete.is_atom(NEGATIVE) {
            return None;
        }
        return Some(bindings.clone());
    }
    if concrete.arity() != pattern.arity() {
        return None;
    }

    let mut unified = bindings.clone();
    for (fixed, atom) in concrete.atoms().iter().zip(pattern.atoms()) {
        if let Some(bound) = unified.get(atom) {
            if bound != fixed {
                return None;
            }
            continue;
        }
        if is_variable(atom) {
            unified.insert(atom.clone(), fixed.clone());
            continue;
        }
        if atom != fixed {
            return None;
        }
    }
    Some(unified)
}

/// Unify a fact's key and then its value against a `key:value` pattern.
pub fn unify_fact(
    fact_key: &Key,
    fact_value: &Key,
    key_pattern: &Key,
    value_pattern: &Key,
    bindings: &Bindings,
) -> Option<Bindings> {
    let bound = unify(fact_key, key_pattern, bindings)?;
    unify(fact_value, value_pattern, &bound)
}
