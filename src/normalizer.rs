//! Response normalization.
//!
//! Rewrites wire keys (`t:ItemId`, `@ChangeKey`, `DisplayName`) into
//! snake_case (`item_id`, `change_key`, `display_name`) throughout a parsed
//! tree, and optionally extracts every occurrence of a repeated element
//! regardless of how deeply it is nested.
//!
//! Normalization never fails: unexpected shapes are passed through.

use crate::parser::local_part;
use serde_json::{Map, Value};

/// Wire names whose mechanical snake_case form would be wrong.
const IRREGULAR_KEYS: [(&str, &str); 1] = [("UserDN", "user_dn")];

/// Normalize a parsed response.
///
/// With `result_key`, returns an array of every value stored under that key
/// anywhere in the tree (arrays flattened one level), each normalized. When
/// the key does not occur, or without `result_key`, returns the whole tree
/// normalized.
pub fn normalize(tree: &Value, result_key: Option<&str>) -> Value {
    if let Some(key) = result_key {
        let found = find_all(tree, key);
        if !found.is_empty() {
            let items = found
                .into_iter()
                .flat_map(|value| match value {
                    Value::Array(items) => items.iter().collect::<Vec<_>>(),
                    other => vec![other],
                })
                .map(normalize_keys)
                .collect();
            return Value::Array(items);
        }
    }
    normalize_keys(tree)
}

/// Recursively rewrite every object key, preserving structure.
pub fn normalize_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(rewrite_key(k), normalize_keys(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize_keys).collect()),
        scalar => scalar.clone(),
    }
}

/// Every value stored under `key`, in document order, at any depth.
///
/// Matching values are not searched further. Order follows the tree, not the
/// raw document: the parser groups repeated siblings into one array at the
/// position of the first, so in `<R><Item>a</Item><G><Item>b</Item></G>
/// <Item>c</Item></R>` the result is `a, c, b`.
pub fn find_all<'a>(tree: &'a Value, key: &str) -> Vec<&'a Value> {
    let mut found = Vec::new();
    collect(tree, key, &mut found);
    found
}

fn collect<'a>(value: &'a Value, key: &str, found: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if k == key {
                    found.push(v);
                } else {
                    collect(v, key, found);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, key, found);
            }
        }
        _ => {}
    }
}

/// Strip the attribute marker and namespace prefix, then snake_case.
pub fn rewrite_key(key: &str) -> String {
    let bare = local_part(key);
    if let Some((_, fixed)) = IRREGULAR_KEYS.iter().find(|(wire, _)| *wire == bare) {
        return fixed.to_string();
    }
    to_snake_case(bare)
}

/// Insert `_` before each uppercase letter and lowercase it; leading
/// underscores are dropped.
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        if c.is_uppercase() {
            out.push('_');
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out.trim_start_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("DisplayName"), "display_name");
        assert_eq!(to_snake_case("itemId"), "item_id");
        assert_eq!(to_snake_case("ID"), "i_d");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("#text"), "#text");
    }

    #[test]
    fn test_rewrite_key() {
        assert_eq!(rewrite_key("t:ItemId"), "item_id");
        assert_eq!(rewrite_key("@ChangeKey"), "change_key");
        assert_eq!(rewrite_key("@xsi:type"), "type");
        assert_eq!(rewrite_key("UserDN"), "user_dn");
        assert_eq!(rewrite_key("MailboxDN"), "mailbox_d_n");
    }

    #[test]
    fn test_whole_tree_mode() {
        let tree = json!({
            "Envelope": {
                "Body": {
                    "t:Items": [
                        {"t:Message": {"t:ItemId": {"@Id": "A1", "@ChangeKey": "C1"}}},
                        {"t:Message": {"t:Subject": "Hi"}}
                    ]
                }
            }
        });
        let out = normalize(&tree, None);
        assert_eq!(
            out,
            json!({
                "envelope": {
                    "body": {
                        "items": [
                            {"message": {"item_id": {"id": "A1", "change_key": "C1"}}},
                            {"message": {"subject": "Hi"}}
                        ]
                    }
                }
            })
        );
    }

    #[test]
    fn test_idempotent_on_snake_case() {
        let tree = json!({"display_name": "x", "items": [{"item_id": {"id": "1"}}], "n": null});
        assert_eq!(normalize(&tree, None), tree);
        let once = normalize(&json!({"DisplayName": {"EmailAddress": "a"}}), None);
        assert_eq!(normalize(&once, None), once);
    }

    #[test]
    fn test_result_key_sibling_branches_in_order() {
        let tree = json!({
            "Root": {
                "Left": {"Item": {"Name": "first"}},
                "Right": {"Deeper": {"Item": {"Name": "second"}}}
            }
        });
        let out = normalize(&tree, Some("Item"));
        assert_eq!(out, json!([{"name": "first"}, {"name": "second"}]));
    }

    #[test]
    fn test_result_key_flattens_one_level() {
        let tree = json!({"Items": {"Item": [{"Id": "1"}, {"Id": "2"}]}, "More": {"Item": {"Id": "3"}}});
        let out = normalize(&tree, Some("Item"));
        assert_eq!(out, json!([{"id": "1"}, {"id": "2"}, {"id": "3"}]));
    }

    #[test]
    fn test_result_key_depth_independent() {
        let shallow = json!({"List": [{"Item": {"Value": "v"}}]});
        let deep = json!({"A": [[{"B": [{"C": [{"Item": {"Value": "v"}}]}]}]]});
        assert_eq!(normalize(&shallow, Some("Item")), normalize(&deep, Some("Item")));
        assert_eq!(normalize(&deep, Some("Item")), json!([{"value": "v"}]));
    }

    #[test]
    fn test_result_key_interleaved_levels_group_siblings() {
        let tree = crate::parser::parse_xml(
            b"<R><Item>a</Item><G><Item>b</Item></G><Item>c</Item></R>",
        )
        .unwrap();
        assert_eq!(normalize(&tree, Some("Item")), json!(["a", "c", "b"]));
    }

    #[test]
    fn test_result_key_missing_falls_back() {
        let tree = json!({"ResponseCode": "NoError"});
        assert_eq!(normalize(&tree, Some("Item")), json!({"response_code": "NoError"}));
    }

    #[test]
    fn test_result_key_attribute() {
        let tree = json!({"AlternateId": {"@Format": "EwsId", "@Id": "NEW", "@Mailbox": "a@b.com"}});
        assert_eq!(normalize(&tree, Some("@Id")), json!(["NEW"]));
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(normalize(&json!("text"), None), json!("text"));
        assert_eq!(normalize(&json!(null), Some("Item")), json!(null));
    }
}
