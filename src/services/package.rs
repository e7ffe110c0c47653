//! Catalog CRUD over the store.

use std::sync::Arc;

use crate::store::models::{MergedPackage, NewPackage, PackageInfo};
use crate::store::{Store, StoreError};

pub struct PackageService {
    store: Arc<Store>,
}

impl PackageService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<MergedPackage>, StoreError> {
        self.store.list_merged()
    }

    pub fn get(&self, id: i64) -> Result<Option<MergedPackage>, StoreError> {
        self.store.get_merged(id)
    }

    pub fn create(&self, new: &NewPackage) -> Result<PackageInfo, StoreError> {
        self.store.create_package(new)
    }

    pub fn update(&self, id: i64, new: &NewPackage) -> Result<PackageInfo, StoreError> {
        self.store.update_package(id, new)
    }

    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.store.delete_package(id)
    }
}
