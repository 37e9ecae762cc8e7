//! Black-box scenarios S1-S6 (spec §8) driven through the public API only.

use urbis::{IndexConfig, Point, SpatialIndex};

#[test]
fn s1_small_build_and_range() {
    let mut index = SpatialIndex::create(IndexConfig::default());
    index.insert_point(5.0, 5.0).unwrap();
    index.insert_point(15.0, 15.0).unwrap();
    index.insert_point(25.0, 25.0).unwrap();
    index.build().unwrap();

    let hits = index.query_range(&urbis::Mbr::new(0.0, 0.0, 20.0, 20.0));
    let mut ids: Vec<u64> = hits.iter().map(|o| o.id()).collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(index.count(), 3);
}

#[test]
fn s2_polyline_centroid() {
    let mut index = SpatialIndex::create(IndexConfig::default());
    index
        .insert_polyline(vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)])
        .unwrap();
    let obj = index.get(1).unwrap();
    assert_eq!(obj.centroid(), Point::new(5.0, 0.0));
    assert_eq!(obj.mbr(), urbis::Mbr::new(0.0, 0.0, 10.0, 0.0));

    let hits = index.query_range(&urbis::Mbr::new(4.0, -1.0, 6.0, 1.0));
    assert_eq!(hits.len(), 1);
}

#[test]
fn s3_polygon_centroid() {
    let mut index = SpatialIndex::create(IndexConfig::default());
    index
        .insert_polygon(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
            Point::new(0.0, 0.0),
        ])
        .unwrap();
    let obj = index.get(1).unwrap();
    assert_eq!(obj.centroid(), Point::new(5.0, 5.0));
    if let urbis::Geometry::Polygon(p) = obj.geometry() {
        assert_eq!(p.area(), 100.0);
    } else {
        panic!("expected polygon");
    }
}

#[test]
fn s4_adjacency() {
    let cfg = IndexConfig {
        page_capacity: 4,
        ..IndexConfig::default()
    };
    let mut index = SpatialIndex::create(cfg);
    for i in 0..10i64 {
        for j in 0..5i64 {
            index
                .insert_point((i * 100) as f64, (j * 100) as f64)
                .unwrap();
        }
    }
    index.build().unwrap();

    let region = urbis::Mbr::new(150.0, 150.0, 350.0, 350.0);
    let adjacent = index.find_adjacent_pages(&region);
    assert!(!adjacent.pages.is_empty());
    let count = adjacent.pages.len();
    assert!(adjacent.estimated_seeks <= count.saturating_sub(1));
}

#[test]
fn s5_knn() {
    let mut index = SpatialIndex::create(IndexConfig::default());
    for (x, y) in [
        (0.0, 0.0),
        (1.0, 1.0),
        (2.0, 2.0),
        (10.0, 10.0),
        (20.0, 20.0),
    ] {
        index.insert_point(x, y).unwrap();
    }
    index.build().unwrap();

    let hits = index.query_knn(0.5, 0.5, 2);
    let ids: Vec<u64> = hits.iter().map(|o| o.id()).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn s6_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.urbis");

    let mut index = SpatialIndex::create(IndexConfig::default());
    index.insert_point(1.0, 1.0).unwrap();
    index.insert_point(2.0, 2.0).unwrap();
    index.build().unwrap();
    index.save(&path).unwrap();

    let mut reloaded = SpatialIndex::create(IndexConfig::default());
    reloaded.load(&path).unwrap();
    assert_eq!(reloaded.count(), 2);
    let b = reloaded.bounds();
    assert!((b.min_x - 1.0).abs() < 1e-12);
    assert!((b.min_y - 1.0).abs() < 1e-12);
    assert!((b.max_x - 2.0).abs() < 1e-12);
    assert!((b.max_y - 2.0).abs() < 1e-12);
}
