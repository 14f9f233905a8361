use alloc::vec::Vec;

// ---- bundle builders ----
//
// A real schema compiler emits these bundles; the builders below lay out the
// same records by hand so the tests stay self contained.  The codec tests
// reuse them, which is why they're crate visible.

pub(crate) fn item(payload: &[u8]) -> Vec<u8> {
    let mut out = (payload.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

pub(crate) fn record(slots: &[u16], blobs: &[&[u8]]) -> Vec<u8> {
    let mut out = (slots.len() as u16).to_le_bytes().to_vec();
    for s in slots {
        out.extend_from_slice(&s.to_le_bytes());
    }
    for b in blobs {
        out.extend_from_slice(&item(b));
    }
    out
}

pub(crate) fn inline(v: i32) -> u16 {
    ((v + 1) * 2) as u16
}

fn push_attrs(slots: &mut Vec<u16>, attrs: &[(i32, u16)]) {
    let mut last = 0i32;
    for (tag, slot) in attrs {
        if *tag > last + 1 {
            slots.push(((*tag - last - 2) * 2 + 1) as u16);
        }
        slots.push(*slot);
        last = *tag;
    }
}

/// One `.field` record.  `buildin` of `None` makes `type_or_extra` a struct
/// type index.
pub(crate) fn field_record(name: &str, buildin: Option<i32>, type_or_extra: Option<i32>, tag: i32, array: bool, key: Option<i32>) -> Vec<u8> {
    let mut attrs: Vec<(i32, u16)> = Vec::new();
    if let Some(b) = buildin {
        attrs.push((1, inline(b)));
    }
    if let Some(t) = type_or_extra {
        attrs.push((2, inline(t)));
    }
    attrs.push((3, inline(tag)));
    if array {
        attrs.push((4, inline(1)));
    }
    if let Some(k) = key {
        attrs.push((5, inline(k)));
    }
    let mut slots = vec![0u16];
    push_attrs(&mut slots, &attrs);
    record(&slots, &[name.as_bytes()])
}

pub(crate) fn type_record(name: &str, fields: &[Vec<u8>]) -> Vec<u8> {
    if fields.is_empty() {
        return record(&[0], &[name.as_bytes()]);
    }
    let mut array = Vec::new();
    for f in fields {
        array.extend_from_slice(&item(f));
    }
    record(&[0, 0], &[name.as_bytes(), &array])
}

pub(crate) fn protocol_record(name: &str, tag: i32, request: Option<i32>, response: Option<i32>, confirm: bool) -> Vec<u8> {
    let mut attrs: Vec<(i32, u16)> = vec![(1, inline(tag))];
    if let Some(r) = request {
        attrs.push((2, inline(r)));
    }
    if let Some(r) = response {
        attrs.push((3, inline(r)));
    }
    if confirm {
        attrs.push((4, inline(1)));
    }
    let mut slots = vec![0u16];
    push_attrs(&mut slots, &attrs);
    record(&slots, &[name.as_bytes()])
}

pub(crate) fn bundle(types: &[Vec<u8>], protocols: Option<&[Vec<u8>]>) -> Vec<u8> {
    let mut type_array = Vec::new();
    for t in types {
        type_array.extend_from_slice(&item(t));
    }
    match protocols {
        None => record(&[0], &[&type_array]),
        Some(ps) => {
            let mut proto_array = Vec::new();
            for p in ps {
                proto_array.extend_from_slice(&item(p));
            }
            record(&[0, 0], &[&type_array, &proto_array])
        }
    }
}

/// `.Person { name 0 : string, age 1 : integer }`
pub(crate) fn person_bundle() -> Vec<u8> {
    let person = type_record("Person", &[
        field_record("name", Some(2), None, 0, false, None),
        field_record("age", Some(0), None, 1, false, None),
    ]);
    bundle(&[person], None)
}

#[cfg(test)]
mod schema_tests {

    use super::*;
    use crate::error::ZP_Error;
    use crate::schema::{ZP_Kind, ZP_Schema};

    #[test]
    fn person_parses() -> Result<(), ZP_Error> {
        let schema = ZP_Schema::from_bundle(&person_bundle())?;

        assert_eq!(schema.type_count(), 1);
        assert_eq!(schema.protocol_count(), 0);

        let person = ZP_Error::unwrap(schema.type_by_name("Person"))?;
        assert_eq!(person.name(), "Person");
        assert_eq!(person.field_count(), 2);

        let t = &schema.types[0];
        assert_eq!(schema.memory.read(t.fields[0].name), "name");
        assert_eq!(t.fields[0].kind, ZP_Kind::String);
        assert_eq!(t.fields[0].tag, 0);
        assert_eq!(t.fields[0].extra, 0);
        assert_eq!(schema.memory.read(t.fields[1].name), "age");
        assert_eq!(t.fields[1].kind, ZP_Kind::Integer);
        assert_eq!(t.fields[1].tag, 1);
        assert_eq!(t.base, 0);
        assert_eq!(t.maxn, 2);
        Ok(())
    }

    #[test]
    fn empty_bundle_parses() -> Result<(), ZP_Error> {
        // zero fields, padded to the minimum record size
        let schema = ZP_Schema::from_bundle(&[0, 0, 0, 0])?;
        assert_eq!(schema.type_count(), 0);
        assert_eq!(schema.protocol_count(), 0);
        Ok(())
    }

    #[test]
    fn type_without_fields() -> Result<(), ZP_Error> {
        let schema = ZP_Schema::from_bundle(&bundle(&[type_record("Void", &[])], None))?;
        let t = ZP_Error::unwrap(schema.type_by_name("Void"))?;
        assert_eq!(t.field_count(), 0);
        assert_eq!(schema.types[0].base, -1);
        assert_eq!(schema.types[0].maxn, 0);
        Ok(())
    }

    #[test]
    fn tag_holes_disable_direct_lookup() -> Result<(), ZP_Error> {
        let gappy = type_record("Gappy", &[
            field_record("a", Some(0), None, 0, false, None),
            field_record("b", Some(0), None, 3, false, None),
        ]);
        let schema = ZP_Schema::from_bundle(&bundle(&[gappy], None))?;
        let t = &schema.types[0];
        assert_eq!(t.base, -1);
        // one extra worst case slot for the skip marker
        assert_eq!(t.maxn, 3);
        assert!(t.field_by_tag(0).is_some());
        assert!(t.field_by_tag(1).is_none());
        assert!(t.field_by_tag(2).is_none());
        assert!(t.field_by_tag(3).is_some());
        assert!(t.field_by_tag(4).is_none());
        Ok(())
    }

    #[test]
    fn dense_tags_use_direct_lookup() -> Result<(), ZP_Error> {
        let t = type_record("Shifted", &[
            field_record("a", Some(0), None, 2, false, None),
            field_record("b", Some(0), None, 3, false, None),
            field_record("c", Some(0), None, 4, false, None),
        ]);
        let schema = ZP_Schema::from_bundle(&bundle(&[t], None))?;
        let t = &schema.types[0];
        assert_eq!(t.base, 2);
        assert_eq!(schema.memory.read(ZP_Error::unwrap(t.field_by_tag(3))?.name), "b");
        assert!(t.field_by_tag(1).is_none());
        assert!(t.field_by_tag(5).is_none());
        Ok(())
    }

    #[test]
    fn struct_array_and_key_fields() -> Result<(), ZP_Error> {
        let entry = type_record("Entry", &[
            field_record("id", Some(0), None, 0, false, None),
        ]);
        let holder = type_record("Holder", &[
            field_record("entries", None, Some(0), 0, true, Some(0)),
        ]);
        let schema = ZP_Schema::from_bundle(&bundle(&[entry, holder], None))?;
        let f = &schema.types[1].fields[0];
        assert_eq!(f.kind, ZP_Kind::Struct(0));
        assert!(f.is_array);
        assert_eq!(f.key, 0);
        Ok(())
    }

    #[test]
    fn decimal_and_binary_refinements() -> Result<(), ZP_Error> {
        let t = type_record("Mixed", &[
            field_record("price", Some(0), Some(2), 0, false, None),
            field_record("payload", Some(2), Some(1), 1, false, None),
        ]);
        let schema = ZP_Schema::from_bundle(&bundle(&[t], None))?;
        assert_eq!(schema.types[0].fields[0].extra, 100);
        assert_eq!(schema.types[0].fields[1].extra, 1);
        Ok(())
    }

    #[test]
    fn protocols_sort_and_look_up() -> Result<(), ZP_Error> {
        let ping = type_record("Ping", &[]);
        let pong = type_record("Pong", &[]);
        // out of tag order on purpose
        let protos = [
            protocol_record("query", 20, Some(0), Some(1), false),
            protocol_record("heartbeat", 10, None, None, false),
            protocol_record("notify", 15, Some(0), None, true),
        ];
        let schema = ZP_Schema::from_bundle(&bundle(&[ping, pong], Some(&protos)))?;
        assert_eq!(schema.protocol_count(), 3);
        assert_eq!(schema.protocols[0].tag, 10);
        assert_eq!(schema.protocols[2].tag, 20);

        let query = ZP_Error::unwrap(schema.protocol_by_tag(20))?;
        assert_eq!(query.name(), "query");
        assert_eq!(ZP_Error::unwrap(query.request())?.name(), "Ping");
        assert_eq!(ZP_Error::unwrap(query.response())?.name(), "Pong");
        assert!(query.has_response());

        let heartbeat = ZP_Error::unwrap(schema.protocol_by_name("heartbeat"))?;
        assert_eq!(heartbeat.tag(), 10);
        assert!(heartbeat.request().is_none());
        assert!(heartbeat.response().is_none());
        assert!(!heartbeat.has_response());

        // confirm without a response type still expects an acknowledgement
        let notify = ZP_Error::unwrap(schema.protocol_by_tag(15))?;
        assert!(notify.response().is_none());
        assert!(notify.confirm());
        assert!(notify.has_response());

        assert!(schema.protocol_by_tag(11).is_none());
        assert!(schema.protocol_by_name("nope").is_none());
        Ok(())
    }

    #[test]
    fn rejects_unknown_buildin() {
        let t = type_record("Bad", &[field_record("f", Some(9), None, 0, false, None)]);
        assert!(ZP_Schema::from_bundle(&bundle(&[t], None)).is_err());
    }

    #[test]
    fn rejects_descending_tags() {
        let t = type_record("Bad", &[
            field_record("a", Some(0), None, 1, false, None),
            field_record("b", Some(0), None, 0, false, None),
        ]);
        assert!(ZP_Schema::from_bundle(&bundle(&[t], None)).is_err());
    }

    #[test]
    fn rejects_duplicate_tags() {
        let t = type_record("Bad", &[
            field_record("a", Some(0), None, 1, false, None),
            field_record("b", Some(0), None, 1, false, None),
        ]);
        assert!(ZP_Schema::from_bundle(&bundle(&[t], None)).is_err());
    }

    #[test]
    fn rejects_type_index_out_of_range() {
        let t = type_record("Bad", &[field_record("f", None, Some(5), 0, false, None)]);
        assert!(ZP_Schema::from_bundle(&bundle(&[t], None)).is_err());
    }

    #[test]
    fn rejects_field_without_name() {
        // slots: skip tag 0, then buildin and tag only
        let nameless = record(&[1, inline(0), 1, inline(0)], &[]);
        let t = type_record("Bad", &[nameless]);
        assert!(ZP_Schema::from_bundle(&bundle(&[t], None)).is_err());
    }

    #[test]
    fn rejects_protocol_without_tag() {
        let p = record(&[0], &[b"lonely"]);
        assert!(ZP_Schema::from_bundle(&bundle(&[], Some(&[p]))).is_err());
    }

    #[test]
    fn rejects_truncated_bundles() {
        let full = person_bundle();
        assert!(ZP_Schema::from_bundle(&[]).is_err());
        for cut in &[1usize, 4, 10, full.len() - 1] {
            assert!(ZP_Schema::from_bundle(&full[..*cut]).is_err(), "cut at {}", cut);
        }
    }

    #[test]
    fn dump_renders_the_schema() -> Result<(), ZP_Error> {
        let entry = type_record("Entry", &[
            field_record("id", Some(0), None, 0, false, None),
            field_record("price", Some(0), Some(2), 1, false, None),
        ]);
        let holder = type_record("Holder", &[
            field_record("entries", None, Some(0), 0, true, Some(0)),
            field_record("tags", Some(2), None, 1, true, None),
        ]);
        let protos = [
            protocol_record("get", 1, Some(1), Some(0), false),
            protocol_record("set", 2, Some(1), None, true),
        ];
        let schema = ZP_Schema::from_bundle(&bundle(&[entry, holder], Some(&protos)))?;
        let text = schema.dump();
        assert!(text.contains("=== 2 types ==="));
        assert!(text.contains("\tid (0) integer"));
        assert!(text.contains("\tprice (1) decimal(100)"));
        assert!(text.contains("\tentries (0) *Entry[0]"));
        assert!(text.contains("\ttags (1) *string"));
        assert!(text.contains("=== 2 protocol ==="));
        assert!(text.contains("\tget (1) request:Holder response:Entry"));
        assert!(text.contains("\tset (2) request:Holder response nil"));
        Ok(())
    }
}
