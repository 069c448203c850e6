// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical item signature used for duplicate-sale detection.

/// Build the canonical signature for a set of `(sku, quantity)` pairs.
///
/// The signature is order-insensitive: entries are rendered as `sku:qty`,
/// sorted, and joined with `|`. Two carts with the same contents in any
/// order produce the same signature.
pub fn items_signature<'a>(items: impl IntoIterator<Item = (&'a str, u32)>) -> String {
    let mut parts: Vec<String> = items
        .into_iter()
        .map(|(sku, qty)| format!("{sku}:{qty}"))
        .collect();
    parts.sort();
    parts.join("|")
}
