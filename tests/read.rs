mod common;

use lodestore::{
    ArrayResult, ELEMENT_DESCRIPTOR_LEN, Error, MAX_READ_ERRORS, MEMBER_DESCRIPTOR_LEN,
    ObjectResult, PTR_LEN, Ptr, RESULT_HEADER_LEN, ReadErrorCode, EntityKind,
};

#[test]
fn object_read_packs_names_and_values() {
    let (_dir, store) = common::store();

    let mut wtxn = store.write_txn().unwrap();
    let obj = store.create_object(&mut wtxn).unwrap();
    store.put_member(&mut wtxn, &obj, b"beta", b"2").unwrap();
    store.put_member(&mut wtxn, &obj, b"alpha", b"1").unwrap();
    wtxn.commit().unwrap();

    let rtxn = store.read_txn().unwrap();
    let mut buf = vec![0u8; 4096];
    let result = store.get_object(&rtxn, &obj, &mut buf).unwrap();

    assert_eq!(result.member_count(), 2);
    assert_eq!(result.error_count(), 0);

    // Name order is lexicographic.
    let first = result.member(0).unwrap();
    assert_eq!(first.name, b"alpha");
    assert_eq!(first.value, Some(b"1".as_slice()));
    let second = result.member(1).unwrap();
    assert_eq!(second.name, b"beta");
    assert_eq!(second.value, Some(b"2".as_slice()));

    assert!(result.find(b"beta").is_some());
    assert!(result.find(b"gamma").is_none());
}

#[test]
fn missing_value_is_a_soft_error() {
    let (_dir, store) = common::store();

    let mut wtxn = store.write_txn().unwrap();
    let obj = store.create_object(&mut wtxn).unwrap();
    store.register_member(&mut wtxn, &obj, b"pending").unwrap();
    wtxn.commit().unwrap();

    let rtxn = store.read_txn().unwrap();
    assert!(!store.member_value_exists(&rtxn, &obj, b"pending").unwrap());

    let mut buf = vec![0u8; 4096];
    let result = store.get_object(&rtxn, &obj, &mut buf).unwrap();
    assert_eq!(result.member_count(), 1);

    let member = result.member(0).unwrap();
    assert_eq!(member.name, b"pending");
    assert_eq!(member.value, None);

    let errors: Vec<_> = result.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ReadErrorCode::MemberMissing);
    assert_eq!(errors[0].entity_ptr, obj);
    // The error points at the packed name bytes.
    let span = errors[0].element_offset..errors[0].element_offset + errors[0].element_len;
    assert_eq!(&result.as_bytes()[span], b"pending");
}

#[test]
fn absent_entity_reads_as_empty_with_soft_error() {
    let (_dir, store) = common::store();
    let ghost = Ptr::from_bytes([9u8; PTR_LEN]).with_kind(EntityKind::Object);

    let rtxn = store.read_txn().unwrap();
    let mut buf = vec![0u8; 1024];
    let result = store.get_object(&rtxn, &ghost, &mut buf).unwrap();
    assert_eq!(result.member_count(), 0);

    let errors: Vec<_> = result.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ReadErrorCode::EntityNotFound);
    assert_eq!(errors[0].entity_ptr, ghost);

    let arr_ghost = Ptr::from_bytes([9u8; PTR_LEN]).with_kind(EntityKind::Array);
    let result = store.get_array(&rtxn, &arr_ghost, &mut buf).unwrap();
    assert_eq!(result.element_count(), 0);
    assert_eq!(result.errors().next().unwrap().code, ReadErrorCode::EntityNotFound);
}

#[test]
fn too_small_buffers_fail_hard() {
    let (_dir, store) = common::store();

    let mut wtxn = store.write_txn().unwrap();
    let obj = store.create_object(&mut wtxn).unwrap();
    store.put_member(&mut wtxn, &obj, b"k", b"v").unwrap();
    wtxn.commit().unwrap();

    let rtxn = store.read_txn().unwrap();

    let mut tiny = vec![0u8; 32];
    assert!(matches!(store.get_object(&rtxn, &obj, &mut tiny), Err(Error::BufferTooSmall)));

    // Header plus one descriptor is the floor for an empty result, but
    // packing one member needs room for its bytes too.
    let mut floor = vec![0u8; RESULT_HEADER_LEN + MEMBER_DESCRIPTOR_LEN];
    assert!(matches!(store.get_object(&rtxn, &obj, &mut floor), Err(Error::BufferTooSmall)));

    let mut enough = vec![0u8; RESULT_HEADER_LEN + MEMBER_DESCRIPTOR_LEN + 2];
    let result = store.get_object(&rtxn, &obj, &mut enough).unwrap();
    assert_eq!(result.member_count(), 1);
}

#[test]
fn min_buffer_suffices_for_an_empty_entity() {
    let (_dir, store) = common::store();

    let mut wtxn = store.write_txn().unwrap();
    let obj = store.create_object(&mut wtxn).unwrap();
    wtxn.commit().unwrap();

    let rtxn = store.read_txn().unwrap();
    let mut buf = vec![0u8; RESULT_HEADER_LEN + MEMBER_DESCRIPTOR_LEN];
    let result = store.get_object(&rtxn, &obj, &mut buf).unwrap();
    assert_eq!(result.member_count(), 0);
    assert_eq!(result.error_count(), 0);

    let mut below = vec![0u8; RESULT_HEADER_LEN + MEMBER_DESCRIPTOR_LEN - 1];
    assert!(matches!(store.get_object(&rtxn, &obj, &mut below), Err(Error::BufferTooSmall)));
}

#[test]
fn member_list_returns_names_only() {
    let (_dir, store) = common::store();

    let mut wtxn = store.write_txn().unwrap();
    let obj = store.create_object(&mut wtxn).unwrap();
    store.put_member(&mut wtxn, &obj, b"b", b"2").unwrap();
    store.put_member(&mut wtxn, &obj, b"a", b"1").unwrap();
    store.register_member(&mut wtxn, &obj, b"c").unwrap();
    wtxn.commit().unwrap();

    let rtxn = store.read_txn().unwrap();
    let mut buf = vec![0u8; 1024];
    let names = store.list_members(&rtxn, &obj, &mut buf).unwrap();
    assert_eq!(names.element_count(), 3);
    let listed: Vec<_> = names.iter().collect();
    assert_eq!(listed, vec![b"a".as_slice(), b"b".as_slice(), b"c".as_slice()]);
}

#[test]
fn descriptors_stay_inside_the_buffer() {
    let (_dir, store) = common::store();

    let mut wtxn = store.write_txn().unwrap();
    let obj = store.create_object(&mut wtxn).unwrap();
    for i in 0..16u8 {
        store.put_member(&mut wtxn, &obj, &[b'm', i], &vec![i; usize::from(i) * 7]).unwrap();
    }
    wtxn.commit().unwrap();

    let rtxn = store.read_txn().unwrap();
    let mut buf = vec![0u8; 8192];
    let buf_len = buf.len();
    let result = store.get_object(&rtxn, &obj, &mut buf).unwrap();
    assert_eq!(result.member_count(), 16);

    for member in result.iter() {
        let name_end = member.name.as_ptr() as usize + member.name.len();
        let buf_end = result.as_bytes().as_ptr() as usize + buf_len;
        assert!(name_end <= buf_end);
        let value = member.value.unwrap();
        assert!(value.as_ptr() as usize + value.len() <= buf_end);
    }

    // The packed bytes match the stored bytes.
    for (i, member) in result.iter().enumerate() {
        assert_eq!(member.name, &[b'm', i as u8]);
        assert_eq!(member.value.unwrap(), &vec![i as u8; i * 7][..]);
    }
}

#[test]
fn soft_errors_cap_at_the_table_size() {
    let (_dir, store) = common::store();

    let mut wtxn = store.write_txn().unwrap();
    let obj = store.create_object(&mut wtxn).unwrap();
    for i in 0..(MAX_READ_ERRORS as u8 + 4) {
        store.register_member(&mut wtxn, &obj, &[b'p', i]).unwrap();
    }
    wtxn.commit().unwrap();

    let rtxn = store.read_txn().unwrap();
    let mut buf = vec![0u8; 8192];
    let result = store.get_object(&rtxn, &obj, &mut buf).unwrap();

    assert_eq!(result.member_count(), MAX_READ_ERRORS + 4);
    assert_eq!(result.error_count(), MAX_READ_ERRORS);
    assert_eq!(result.errors().count(), MAX_READ_ERRORS);
}

#[test]
fn results_reparse_after_a_copy() {
    let (_dir, store) = common::store();

    let mut wtxn = store.write_txn().unwrap();
    let obj = store.create_object(&mut wtxn).unwrap();
    store.put_member(&mut wtxn, &obj, b"k", b"v").unwrap();
    let arr = store.create_array(&mut wtxn).unwrap();
    store.append(&mut wtxn, &arr, b"e").unwrap();
    wtxn.commit().unwrap();

    let rtxn = store.read_txn().unwrap();

    let mut buf = vec![0u8; 1024];
    let original = store.get_object(&rtxn, &obj, &mut buf).unwrap();
    let copied = original.as_bytes().to_vec();
    drop(rtxn);

    let reparsed = ObjectResult::from_bytes(&copied).unwrap();
    assert_eq!(reparsed.member_count(), 1);
    let member = reparsed.member(0).unwrap();
    assert_eq!(member.name, b"k");
    assert_eq!(member.value, Some(b"v".as_slice()));

    let rtxn = store.read_txn().unwrap();
    let mut buf = vec![0u8; 1024];
    let list = store.get_array(&rtxn, &arr, &mut buf).unwrap();
    let copied = list.as_bytes().to_vec();
    let reparsed = ArrayResult::from_bytes(&copied).unwrap();
    assert_eq!(reparsed.element_count(), 1);
    assert_eq!(reparsed.element(0).unwrap(), b"e");
}

#[test]
fn corrupted_buffers_fail_validation() {
    let (_dir, store) = common::store();

    let mut wtxn = store.write_txn().unwrap();
    let obj = store.create_object(&mut wtxn).unwrap();
    store.put_member(&mut wtxn, &obj, b"k", b"v").unwrap();
    wtxn.commit().unwrap();

    let rtxn = store.read_txn().unwrap();
    let mut buf = vec![0u8; 1024];
    let mut copied = store.get_object(&rtxn, &obj, &mut buf).unwrap().as_bytes().to_vec();

    // Push the first descriptor's name length past the buffer end.
    let name_len_at = RESULT_HEADER_LEN + 8;
    copied[name_len_at..name_len_at + 8].copy_from_slice(&u64::MAX.to_ne_bytes());
    assert!(matches!(ObjectResult::from_bytes(&copied), Err(Error::InvalidParam)));

    // A truncated header is rejected outright.
    assert!(matches!(
        ObjectResult::from_bytes(&[0u8; RESULT_HEADER_LEN - 1]),
        Err(Error::InvalidParam)
    ));
    assert!(matches!(
        ArrayResult::from_bytes(&[0u8; ELEMENT_DESCRIPTOR_LEN]),
        Err(Error::InvalidParam)
    ));
}
