use std::fs;
use std::path::Path;
use std::sync::Arc;

use open_data_sync::error::{PublishError, WarehouseResult};
use open_data_sync::model::{ExternalFormat, Watermark};
use open_data_sync::publish::{CatalogPublisher, PublishRequest, PublishSource};
use open_data_sync::storage::{BlobStore, LocalBlobStore};
use open_data_sync::warehouse::{DatasetSpec, ExternalTableSpec, InMemoryWarehouse, Warehouse};

struct Fixture {
    _bucket: tempfile::TempDir,
    scratch: tempfile::TempDir,
    store: Arc<LocalBlobStore>,
    warehouse: Arc<InMemoryWarehouse>,
    publisher: CatalogPublisher,
}

fn fixture() -> Fixture {
    let bucket = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalBlobStore::new(bucket.path(), "dataverbinders-dev").unwrap());
    let warehouse = Arc::new(InMemoryWarehouse::with_store(store.clone()));
    let publisher = CatalogPublisher::new(warehouse.clone(), store.clone(), "EU");
    Fixture {
        _bucket: bucket,
        scratch,
        store,
        warehouse,
        publisher,
    }
}

fn put(f: &Fixture, key: &str) -> String {
    let name = Path::new(key).file_name().unwrap();
    let local = f.scratch.path().join(name);
    fs::write(&local, b"payload").unwrap();
    f.store.put_file(&local, key).unwrap()
}

#[test]
fn publishes_supported_formats_and_rejects_the_rest() {
    let f = fixture();
    let uris = vec![
        put(&f, "cbs/v3/x/a.parquet"),
        put(&f, "cbs/v3/x/b.json"),
        put(&f, "cbs/v3/x/c.xls"),
    ];
    let request = PublishRequest::new("x", PublishSource::Uris(uris)).with_source(Some("cbs".to_string()));

    let report = f.publisher.publish(&request).unwrap();
    assert_eq!(report.dataset_id, "cbs_x");
    assert_eq!(report.linked.len(), 2);
    assert_eq!(report.rejected.len(), 1);
    assert!(matches!(
        report.rejected[0].1,
        PublishError::UnsupportedExternalFormat { ref suffix, .. } if suffix == "xls"
    ));

    let tables = f.warehouse.list_tables("cbs_x").unwrap();
    let ids: Vec<&str> = tables.iter().map(|t| t.table_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(tables[0].format, ExternalFormat::Parquet);
    assert!(!tables[0].autodetect);
    assert_eq!(tables[1].format, ExternalFormat::NewlineDelimitedJson);
    assert!(tables[1].autodetect);
}

#[test]
fn publishing_twice_yields_the_same_catalog() {
    let f = fixture();
    let uris = vec![put(&f, "mlz/v3/40015NED/kwb-2019.parquet")];
    let request = PublishRequest::new("40015NED", PublishSource::Uris(uris))
        .with_source(Some("mlz".to_string()))
        .with_description("Kerncijfers wijken en buurten")
        .with_watermark(Some(Watermark::from("2021-05-01")));

    let first = f.publisher.publish(&request).unwrap();
    let tables_after_first = f.warehouse.list_tables("mlz_40015NED").unwrap();
    let second = f.publisher.publish(&request).unwrap();
    let tables_after_second = f.warehouse.list_tables("mlz_40015NED").unwrap();

    assert_eq!(first.linked, second.linked);
    assert_eq!(tables_after_first, tables_after_second);
    assert_eq!(tables_after_second[0].table_id, "kwb_2019");
    assert_eq!(f.warehouse.dataset_ids(), vec!["mlz_40015NED"]);
    assert_eq!(
        f.warehouse.dataset("mlz_40015NED").unwrap().description.as_deref(),
        Some("Kerncijfers wijken en buurten")
    );
    assert_eq!(
        f.warehouse.dataset_watermark("mlz_40015NED").unwrap(),
        Some(Watermark::from("2021-05-01"))
    );
}

#[test]
fn publish_replaces_stale_tables() {
    let f = fixture();
    let stale = put(&f, "old/stale.parquet");
    f.warehouse
        .create_dataset(&DatasetSpec {
            dataset_id: "catalogs".to_string(),
            location: "EU".to_string(),
            description: None,
        })
        .unwrap();
    f.warehouse
        .create_external_table(&ExternalTableSpec {
            dataset_id: "catalogs".to_string(),
            table_id: "stale".to_string(),
            source_uris: vec![stale],
            format: ExternalFormat::Parquet,
            autodetect: false,
        })
        .unwrap();

    let fresh = put(&f, "new/fresh.parquet");
    let report = f
        .publisher
        .publish(&PublishRequest::new("catalogs", PublishSource::Uris(vec![fresh])))
        .unwrap();

    assert_eq!(report.dataset_id, "catalogs");
    let tables = f.warehouse.list_tables("catalogs").unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].table_id, "fresh");
}

#[test]
fn missing_object_is_skipped_and_watermark_withheld() {
    let f = fixture();
    let present = put(&f, "cbs/v3/y/present.parquet");
    let missing = f.store.uri("cbs/v3/y/missing.parquet");
    let request = PublishRequest::new("y", PublishSource::Uris(vec![present, missing.clone()]))
        .with_source(Some("cbs".to_string()))
        .with_watermark(Some(Watermark::from("2021-05-01")));

    let report = f.publisher.publish(&request).unwrap();
    assert_eq!(report.linked.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, missing);
    assert!(!report.watermark_recorded);
    assert_eq!(f.warehouse.dataset_watermark("cbs_y").unwrap(), None);
}

#[test]
fn folder_source_links_every_object_below_it() {
    let f = fixture();
    put(&f, "cbs/v4/83583NED/kwb_2019.parquet");
    put(&f, "cbs/v4/83583NED/kwb_2020.parquet");
    put(&f, "cbs/v4/83583NEDX/other.parquet");

    let request = PublishRequest::new("83583NED", PublishSource::Folder("cbs/v4/83583NED/".to_string()))
        .with_source(Some("cbs".to_string()));
    let report = f.publisher.publish(&request).unwrap();

    let ids: Vec<&str> = report.linked.iter().map(|e| e.table_id.as_str()).collect();
    assert_eq!(ids, vec!["kwb_2019", "kwb_2020"]);
    assert!(report.is_complete());
}

#[test]
fn duplicate_table_ids_are_rejected_per_entry() {
    let f = fixture();
    put(&f, "cbs/v4/kwb/2019/data.parquet");
    put(&f, "cbs/v4/kwb/2020/data.parquet");
    put(&f, "cbs/v4/kwb/other.parquet");

    let request = PublishRequest::new("kwb", PublishSource::Folder("cbs/v4/kwb".to_string()))
        .with_source(Some("cbs".to_string()))
        .with_watermark(Some(Watermark::from("2021-05-01")));
    let report = f.publisher.publish(&request).unwrap();

    let ids: Vec<&str> = report.linked.iter().map(|e| e.table_id.as_str()).collect();
    assert_eq!(ids, vec!["data", "other"]);
    assert_eq!(report.linked[0].source_uri, f.store.uri("cbs/v4/kwb/2019/data.parquet"));
    assert_eq!(report.rejected.len(), 1);
    assert!(matches!(
        report.rejected[0].1,
        PublishError::DuplicateTable { ref table_id, ref uri }
            if table_id == "data" && uri.ends_with("2020/data.parquet")
    ));
    assert!(!report.watermark_recorded);
    assert_eq!(f.warehouse.dataset_watermark("cbs_kwb").unwrap(), None);
    assert_eq!(f.warehouse.list_tables("cbs_kwb").unwrap().len(), 2);
}

#[test]
fn duplicate_uris_do_not_abort_the_publish() {
    let f = fixture();
    let kwb = put(&f, "mlz/v3/kwb/kwb.json");
    let request = PublishRequest::new("kwb", PublishSource::Uris(vec![kwb.clone(), kwb.clone()]))
        .with_source(Some("mlz".to_string()));

    let report = f.publisher.publish(&request).unwrap();
    assert_eq!(report.linked.len(), 1);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].0, kwb);
}

// Reports every dataset as absent, so the publisher's create runs into the existing one.
struct StaleListingWarehouse(Arc<InMemoryWarehouse>);

impl Warehouse for StaleListingWarehouse {
    fn dataset_exists(&self, _dataset_id: &str) -> WarehouseResult<bool> {
        Ok(false)
    }

    fn dataset_watermark(&self, dataset_id: &str) -> WarehouseResult<Option<Watermark>> {
        self.0.dataset_watermark(dataset_id)
    }

    fn set_dataset_watermark(&self, dataset_id: &str, watermark: &Watermark) -> WarehouseResult<()> {
        self.0.set_dataset_watermark(dataset_id, watermark)
    }

    fn delete_dataset(&self, dataset_id: &str) -> WarehouseResult<()> {
        self.0.delete_dataset(dataset_id)
    }

    fn create_dataset(&self, spec: &DatasetSpec) -> WarehouseResult<()> {
        self.0.create_dataset(spec)
    }

    fn create_external_table(&self, spec: &ExternalTableSpec) -> WarehouseResult<()> {
        self.0.create_external_table(spec)
    }

    fn list_tables(&self, dataset_id: &str) -> WarehouseResult<Vec<ExternalTableSpec>> {
        self.0.list_tables(dataset_id)
    }
}

#[test]
fn existing_dataset_on_create_is_tolerated() {
    let f = fixture();
    f.warehouse
        .create_dataset(&DatasetSpec {
            dataset_id: "cbs_z".to_string(),
            location: "EU".to_string(),
            description: None,
        })
        .unwrap();
    let publisher = CatalogPublisher::new(
        Arc::new(StaleListingWarehouse(f.warehouse.clone())),
        f.store.clone(),
        "EU",
    );

    let uri = put(&f, "cbs/v3/z/kwb_2019.parquet");
    let request = PublishRequest::new("z", PublishSource::Uris(vec![uri]))
        .with_source(Some("cbs".to_string()))
        .with_watermark(Some(Watermark::from("2021-05-01")));
    let report = publisher.publish(&request).unwrap();

    assert!(report.is_complete());
    assert!(report.watermark_recorded);
    let tables = f.warehouse.list_tables("cbs_z").unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].table_id, "kwb_2019");
}
