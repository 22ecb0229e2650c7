//! Generic CRUD behavior over the `Student` fixture.

mod common;

use common::Student;
use rider_data::Pager;

#[test]
fn create_then_get_returns_every_column() {
    let db = common::open_memory_db();
    let repo = db.repository::<Student>().unwrap();

    let mut input = Student::named("test");
    input.age = Some(10);
    input.source = Some(100.0);
    let created = repo.create(input).unwrap();

    let id = created.id.expect("assigned id");
    assert!(created.create_time.is_some());
    assert_eq!(created.create_time, created.update_time);
    assert_eq!(created.deleted, Some(false));

    let loaded = repo.get(id).unwrap().expect("row exists");
    assert_eq!(loaded, created);
}

#[test]
fn get_one_matches_by_example() {
    let db = common::open_memory_db();
    let repo = db.repository::<Student>().unwrap();

    let mut student = Student::named("test");
    student.age = Some(10);
    student.source = Some(100.0);
    repo.create(student).unwrap();
    repo.create(Student::named("other")).unwrap();

    let found = repo.get_one(Student::named("test")).unwrap().unwrap();
    assert_eq!(found.age, Some(10));
    assert_eq!(found.source, Some(100.0));

    assert!(repo.get_one(Student::named("missing")).unwrap().is_none());
}

#[test]
fn soft_delete_hides_from_lists_but_not_point_lookup() {
    let db = common::open_memory_db();
    let repo = db.repository::<Student>().unwrap();

    let created = repo.create(Student::named("test")).unwrap();
    let id = created.id.unwrap();
    assert_eq!(repo.delete(id).unwrap(), 1);

    assert!(repo.list(Student::default()).unwrap().is_empty());
    assert!(repo.get_one(Student::named("test")).unwrap().is_none());

    let tombstone = repo.get(id).unwrap().expect("row physically remains");
    assert_eq!(tombstone.deleted, Some(true));
    assert_eq!(tombstone.name, Some("test".to_string()));
}

#[test]
fn update_skips_null_fields() {
    let db = common::open_memory_db();
    let repo = db.repository::<Student>().unwrap();

    let mut input = Student::named("test");
    input.age = Some(10);
    input.source = Some(100.0);
    let created = repo.create(input).unwrap();

    let mut patch = Student::default();
    patch.id = created.id;
    patch.age = Some(11);
    assert_eq!(repo.update(patch).unwrap(), 1);

    let after = repo.get(created.id.unwrap()).unwrap().unwrap();
    assert_eq!(after.age, Some(11));
    assert_eq!(after.name, Some("test".to_string()));
    assert_eq!(after.source, Some(100.0));
    assert!(after.update_time.unwrap() >= created.update_time.unwrap());
}

#[test]
fn put_overwrites_missing_fields_with_null() {
    let db = common::open_memory_db();
    let repo = db.repository::<Student>().unwrap();

    let mut input = Student::named("test");
    input.age = Some(10);
    input.source = Some(100.0);
    let created = repo.create(input).unwrap();

    let mut full = created.clone();
    full.name = Some("renamed".to_string());
    full.age = None;
    assert_eq!(repo.put(full).unwrap(), 1);

    let after = repo.get(created.id.unwrap()).unwrap().unwrap();
    assert_eq!(after.name, Some("renamed".to_string()));
    assert_eq!(after.age, None);
    assert_eq!(after.source, Some(100.0));
    assert_eq!(after.deleted, Some(false));
}

#[test]
fn pagination_slices_and_counts() {
    let db = common::open_memory_db();
    let repo = db.repository::<Student>().unwrap();

    for age in 1..=25 {
        let mut student = Student::named("s");
        student.age = Some(age);
        repo.create(student).unwrap();
    }

    let mut pager = Pager::of(Some(3), Some(10));
    repo.list_pager(Student::default(), &mut pager).unwrap();
    assert_eq!(pager.total_count, 25);
    assert_eq!(pager.total_page, 3);
    let ages: Vec<i64> = pager.data.iter().map(|s| s.age.unwrap()).collect();
    assert_eq!(ages, (21..=25).collect::<Vec<i64>>());

    let page = repo.list_page(Student::default(), 2, 10).unwrap();
    assert_eq!(page.len(), 10);
    assert_eq!(page[0].age, Some(11));

    assert_eq!(repo.list(Student::default()).unwrap().len(), 25);
}

#[test]
fn hand_built_pager_with_zero_page_size_is_clamped() {
    let db = common::open_memory_db();
    let repo = db.repository::<Student>().unwrap();

    for age in 1..=3 {
        let mut student = Student::named("s");
        student.age = Some(age);
        repo.create(student).unwrap();
    }

    let mut pager = Pager::of(Some(1), Some(10));
    pager.page_size = 0;
    pager.page_at = 0;
    repo.list_pager(Student::default(), &mut pager).unwrap();
    assert_eq!(pager.page_size, 1);
    assert_eq!(pager.page_at, 1);
    assert_eq!(pager.total_count, 3);
    assert_eq!(pager.total_page, 3);
    assert_eq!(pager.data.len(), 1);
    assert_eq!(pager.data[0].age, Some(1));
}
