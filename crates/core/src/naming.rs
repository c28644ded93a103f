//! Deterministic naming for child orders and backend runs.
//!
//! Child order names are the idempotency key of a fan-out: re-running the
//! fan-out for the same upstream order derives the same names, so the
//! ledger can recognise children it has already created.

use crate::hashing::sha256_hex;
use crate::types::DbId;

/// Maximum length of a backend run name (DNS-1123 label).
pub const MAX_RUN_NAME_LEN: usize = 63;

/// Maximum length of a job name.
pub const MAX_JOB_NAME_LEN: usize = 200;

/// Maximum length of an order name. Derived child names are bounded by
/// the child job name plus the lineage suffix, whatever the depth.
pub const MAX_ORDER_NAME_LEN: usize = 256;

/// Hex digits of the order-name digest kept in shortened run names.
const RUN_DIGEST_LEN: usize = 8;

/// Derive the name of the order created for `child_job_name` when the
/// order `upstream_order_id` completes.
///
/// Convention: `{child}@{upstream_id}` for the first generation and
/// `{child}@{upstream_id}.g{generation}` for forced re-dispatches. The part
/// after the last `@` is digits with an optional `.g{digits}`, so a name
/// parses back to exactly one `(child, upstream, generation)`.
///
/// # Examples
///
/// ```
/// use cascade_core::naming::child_order_name;
///
/// assert_eq!(child_order_name("transcode", 42, 1), "transcode@42");
/// assert_eq!(child_order_name("transcode", 42, 3), "transcode@42.g3");
/// ```
pub fn child_order_name(child_job_name: &str, upstream_order_id: DbId, generation: i32) -> String {
    if generation <= 1 {
        format!("{child_job_name}@{upstream_order_id}")
    } else {
        format!("{child_job_name}@{upstream_order_id}.g{generation}")
    }
}

/// Derive the backend run name for the `attempt`-th submission of an order.
///
/// The result is a valid DNS-1123 label: lowercase alphanumerics and `-`,
/// starting and ending with an alphanumeric, at most 63 characters. The
/// attempt suffix is always preserved. When the order name had to be
/// rewritten or shortened to fit, a digest of the full name is kept before
/// the suffix so distinct orders keep distinct run names.
///
/// # Examples
///
/// ```
/// use cascade_core::naming::run_name;
///
/// assert_eq!(run_name("nightly-42", 1), "nightly-42-1");
///
/// let child = run_name("transcode@42", 1);
/// assert!(child.starts_with("transcode-42-"));
/// assert_ne!(child, run_name("transcode-42", 1));
/// ```
pub fn run_name(order_name: &str, attempt: i32) -> String {
    let suffix = format!("-{attempt}");
    let mut base = sanitize_label(order_name);
    if base == order_name && base.len() + suffix.len() <= MAX_RUN_NAME_LEN {
        if base.is_empty() {
            base.push_str("run");
        }
        return format!("{base}{suffix}");
    }

    let digest = &sha256_hex(order_name.as_bytes())[..RUN_DIGEST_LEN];
    let budget = MAX_RUN_NAME_LEN - suffix.len() - digest.len() - 1;
    if base.len() > budget {
        base.truncate(budget);
        base = base.trim_end_matches('-').to_string();
    }
    if base.is_empty() {
        format!("{digest}{suffix}")
    } else {
        format!("{base}-{digest}{suffix}")
    }
}

/// Lowercase, map every non-alphanumeric run to a single `-`, trim dashes.
fn sanitize_label(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = true;
    for ch in raw.chars() {
        let c = ch.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}
