use serde_json::{Map, Value};

use annolog_core::{Body, Collection, EntityId, EntityKind, EntityRef, EntityType, RefSlot};

const SPATIAL_KEYS: &[&str] = &["type", "media", "frame", "version", "parent", "attributes"];
const GEOMETRY_KEYS: &[&str] = &["x", "y", "width", "height", "u", "v", "points"];
const INTERVAL_KEYS: &[&str] = &["type", "frame", "version", "parent", "attributes"];

/// Relation lists of interval entities: (read key, creation key).
const INTERVAL_RELATIONS: &[(&str, &str)] = &[
    ("media", "media_ids"),
    ("localizations", "localization_ids"),
];

/// Collection that the integers under `key` point into.
fn relation_target(key: &str, kind: EntityKind) -> Option<Collection> {
    let target = match (key, kind) {
        ("parent", EntityKind::Spatial) => "Localization",
        ("parent", EntityKind::Interval) => "State",
        ("media" | "media_ids", EntityKind::Spatial | EntityKind::Interval) => "Media",
        ("localizations" | "localization_ids", EntityKind::Interval) => "Localization",
        _ => return None,
    };
    Some(Collection::from(target))
}

/// Store `value` under `key`, as references into `target` when it holds ids
/// so that reconciliation can follow them.
fn insert_relation(body: &mut Body, key: &str, value: &Value, target: &Collection) {
    if let Some(id) = value.as_i64() {
        body.insert_ref(key, EntityRef::new(target, EntityId::new(id)));
    } else if let Some(ids) = id_list(value) {
        let refs = ids.into_iter().map(|id| EntityRef::new(target, id)).collect();
        body.insert_refs(key, refs);
    } else {
        body.insert(key, value.clone());
    }
}

/// Body that restores what `request` is about to overwrite. Each requested
/// key takes its pre-image value, `null` when the pre-image lacks it;
/// `attributes` is restored per nested key.
pub fn inverse_update_body(pre: &Map<String, Value>, request: &Body, ty: &EntityType) -> Body {
    let mut inverse = Body::new();
    for key in request.keys() {
        if ty.is_server_managed(key) {
            continue;
        }
        if key == "attributes"
            && let Some(Value::Object(requested)) = request.get(key)
        {
            let previous = pre.get("attributes").and_then(Value::as_object);
            let attributes: Map<String, Value> = requested
                .keys()
                .map(|k| {
                    let old = previous.and_then(|p| p.get(k)).cloned();
                    (k.clone(), old.unwrap_or(Value::Null))
                })
                .collect();
            inverse.insert(key, Value::Object(attributes));
            continue;
        }
        let previous = pre.get(key).cloned().unwrap_or(Value::Null);
        let target = request
            .get_ref(key)
            .and_then(RefSlot::collection)
            .cloned()
            .or_else(|| relation_target(key, ty.kind));
        match target {
            Some(target) => insert_relation(&mut inverse, key, &previous, &target),
            None => inverse.insert(key, previous),
        }
    }
    inverse
}

/// Creation body that brings back a deleted entity from its pre-image.
pub fn recreate_body(pre: &Map<String, Value>, ty: &EntityType) -> Body {
    let mut body = match ty.kind {
        EntityKind::Spatial => copy_keys(pre, ty.kind, SPATIAL_KEYS.iter().chain(GEOMETRY_KEYS)),
        EntityKind::Interval => {
            let mut body = copy_keys(pre, ty.kind, INTERVAL_KEYS.iter());
            for (read, create) in INTERVAL_RELATIONS {
                let Some(value) = pre.get(*read).or_else(|| pre.get(*create)) else {
                    continue;
                };
                match relation_target(create, ty.kind) {
                    Some(target) => insert_relation(&mut body, create, value, &target),
                    None => body.insert(*create, value.clone()),
                }
            }
            body
        }
        EntityKind::Media | EntityKind::Generic => Body::from_map(pre.clone()),
    };
    let managed: Vec<String> = body
        .keys()
        .filter(|k| ty.is_server_managed(k))
        .map(str::to_string)
        .collect();
    for key in managed {
        body.remove(&key);
    }
    body
}

fn copy_keys<'a>(
    pre: &Map<String, Value>,
    kind: EntityKind,
    keys: impl Iterator<Item = &'a &'a str>,
) -> Body {
    let mut body = Body::new();
    for key in keys {
        let Some(value) = pre.get(*key) else {
            continue;
        };
        match relation_target(key, kind) {
            Some(target) => insert_relation(&mut body, key, value, &target),
            None => body.insert(*key, value.clone()),
        }
    }
    body
}

fn id_list(value: &Value) -> Option<Vec<EntityId>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_i64().map(EntityId::new))
        .collect()
}

#[cfg(test)]
mod tests {
    use annolog_core::IdRef;
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn request(value: Value) -> Body {
        Body::from_value(value).unwrap()
    }

    #[test]
    fn inverse_restores_nested_attributes() {
        let ty = EntityType::new(1, "Box", EntityKind::Spatial);
        let pre = object(json!({"id": 42, "x": 0.5, "attributes": {"color": "blue", "label": "a"}}));
        let request = request(json!({"attributes": {"color": "red"}}));

        let inverse = inverse_update_body(&pre, &request, &ty).resolve().unwrap();
        assert_eq!(Value::Object(inverse), json!({"attributes": {"color": "blue"}}));
    }

    #[test]
    fn keys_missing_from_pre_image_become_null() {
        let ty = EntityType::new(1, "Box", EntityKind::Spatial);
        let pre = object(json!({"x": 0.5, "attributes": {}}));
        let request = request(json!({"x": 0.7, "u": 0.1, "attributes": {"new": 1}}));

        let inverse = inverse_update_body(&pre, &request, &ty).resolve().unwrap();
        assert_eq!(
            Value::Object(inverse),
            json!({"x": 0.5, "u": null, "attributes": {"new": null}})
        );
    }

    #[test]
    fn server_managed_keys_are_never_written_back() {
        let ty = EntityType::new(1, "Box", EntityKind::Spatial).with_server_managed("elemental_id");
        let pre = object(json!({"modified_by": 3, "elemental_id": "e", "x": 1}));
        let request = request(json!({"modified_by": 4, "elemental_id": "f", "x": 2}));

        let inverse = inverse_update_body(&pre, &request, &ty);
        assert_eq!(inverse.keys().collect::<Vec<_>>(), vec!["x"]);
    }

    #[test]
    fn spatial_recreation_keeps_geometry() {
        let ty = EntityType::new(1, "Box", EntityKind::Spatial);
        let pre = object(json!({
            "id": 42, "project": 1, "created_by": 2, "type": 1, "media": 7, "frame": 3,
            "x": 0.1, "y": 0.2, "width": 0.3, "height": 0.4, "unrelated": true,
        }));

        let body = recreate_body(&pre, &ty).resolve().unwrap();
        assert_eq!(
            Value::Object(body),
            json!({"type": 1, "media": 7, "frame": 3, "x": 0.1, "y": 0.2, "width": 0.3, "height": 0.4})
        );
    }

    #[test]
    fn spatial_recreation_types_parent_and_media_links() {
        let ty = EntityType::new(1, "Box", EntityKind::Spatial);
        let pre = object(json!({"id": 4, "media": 7, "parent": 2, "frame": 0, "x": 0.1}));

        let mut body = recreate_body(&pre, &ty);
        assert_eq!(
            body.get_ref("media").and_then(RefSlot::collection),
            Some(&Collection::from("Media"))
        );
        let parent = Collection::from("Localization");
        assert!(body.references(&parent, &IdRef::Known(EntityId::new(2))));

        // a different resource with the same id is left alone
        let old = IdRef::Known(EntityId::new(2));
        assert_eq!(body.replace_ref(&Collection::from("State"), &old, EntityId::new(9)), 0);
        assert_eq!(body.replace_ref(&parent, &old, EntityId::new(9)), 1);
        assert_eq!(body.resolve().unwrap()["parent"], json!(9));
    }

    #[test]
    fn inverse_keeps_relations_typed() {
        let ty = EntityType::new(2, "Track", EntityKind::Interval);
        let pre = object(json!({"parent": 3, "localization_ids": [1, 2], "label": null}));
        let request = Body::new()
            .with_ref("parent", "State", EntityId::new(8))
            .with("localization_ids", json!([5]))
            .with("frame", 2);

        let inverse = inverse_update_body(&pre, &request, &ty);
        assert!(inverse.references(&Collection::from("State"), &IdRef::Known(EntityId::new(3))));
        assert!(inverse.references(&Collection::from("Localization"), &IdRef::Known(EntityId::new(2))));
        assert_eq!(
            Value::Object(inverse.resolve().unwrap()),
            json!({"parent": 3, "localization_ids": [1, 2], "frame": null})
        );
    }

    #[test]
    fn interval_recreation_renames_relations_as_refs() {
        let ty = EntityType::new(2, "Track", EntityKind::Interval);
        let pre = object(json!({
            "id": 9, "type": 2, "frame": 0, "media": [7], "localizations": [1, 2],
            "attributes": {"Label": "car"},
        }));

        let body = recreate_body(&pre, &ty);
        assert!(body.get_ref("localization_ids").is_some());
        assert!(!body.contains_key("localizations"));
        assert_eq!(
            Value::Object(body.resolve().unwrap()),
            json!({
                "type": 2, "frame": 0, "attributes": {"Label": "car"},
                "media_ids": [7], "localization_ids": [1, 2],
            })
        );
    }

    #[test]
    fn generic_recreation_drops_only_server_managed_keys() {
        let ty = EntityType::new(3, "Leaf", EntityKind::Generic);
        let pre = object(json!({"id": 5, "modified_datetime": "x", "name": "n", "path": "a.b"}));

        let body = recreate_body(&pre, &ty).resolve().unwrap();
        assert_eq!(Value::Object(body), json!({"name": "n", "path": "a.b"}));
    }
}
