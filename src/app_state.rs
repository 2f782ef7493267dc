use std::sync::Arc;

use crate::services::{
    photo_service::PhotoService, queue::QueueChannel, storage::LocalPhotoStorage,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub photos: PhotoService,
    pub storage: Arc<LocalPhotoStorage>,
    pub queue: Arc<dyn QueueChannel>,
}

impl AppState {
    pub fn new(
        photos: PhotoService,
        storage: LocalPhotoStorage,
        queue: Arc<dyn QueueChannel>,
    ) -> Self {
        Self {
            photos,
            storage: Arc::new(storage),
            queue,
        }
    }
}
