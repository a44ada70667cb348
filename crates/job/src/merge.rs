use serde_json::Value;

/// Deep-merges `a` over `b`: dict keys recurse per-key with `a` taking
/// precedence, list values concatenate (`a` first), and any other
/// conflict keeps `a`. Keys present only in `b` are carried through
/// unchanged. Used to layer a seed's configuration over its job's.
pub fn merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(mut b_map)) => {
            let mut merged = serde_json::Map::new();
            let keys: Vec<String> = a_map.keys().cloned().collect();
            for k in keys {
                let av = a_map.remove(&k).unwrap();
                let mv = match b_map.remove(&k) {
                    Some(bv) => merge(av, bv),
                    None => av,
                };
                merged.insert(k, mv);
            }
            for (k, v) in b_map {
                merged.insert(k, v);
            }
            Value::Object(merged)
        }
        (Value::Array(mut a_arr), Value::Array(b_arr)) => {
            a_arr.extend(b_arr);
            Value::Array(a_arr)
        }
        (a, _) => a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_a_wins() {
        assert_eq!(merge(json!(5), json!(10)), json!(5));
    }

    #[test]
    fn lists_concatenate() {
        assert_eq!(merge(json!([1, 2]), json!([3, 4])), json!([1, 2, 3, 4]));
    }

    #[test]
    fn dict_keys_recurse_with_a_precedence() {
        let a = json!({"time_limit": 5, "nested": {"x": 1}});
        let b = json!({"time_limit": 100, "nested": {"x": 2, "y": 3}, "proxy": "p1"});
        let merged = merge(a, b);
        assert_eq!(
            merged,
            json!({"time_limit": 5, "nested": {"x": 1, "y": 3}, "proxy": "p1"})
        );
    }

    #[test]
    fn seed_only_keys_pass_through() {
        let a = json!({"url": "http://example.com/"});
        let b = json!({"time_limit": 100});
        let merged = merge(a, b);
        assert_eq!(
            merged,
            json!({"url": "http://example.com/", "time_limit": 100})
        );
    }
}
