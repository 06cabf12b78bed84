//! Marker edit session.
//!
//! The editor keeps a pending image list next to the form: images already in
//! the store plus new ones attached during this session. New images reach the
//! store only on [`MarkerEditor::save`]; removing a stored image deletes it
//! right away.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::blob_store::BlobStore;
use crate::error::TripError;
use crate::model::{
    data_url_mime, optional_text, require_text, Category, ImageId, Marker, MarkerId, MarkerPatch,
};
use crate::store::EntityStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum PendingImage {
    Stored { id: ImageId, data_url: String },
    New { data_url: String },
}

impl PendingImage {
    pub fn data_url(&self) -> &str {
        match self {
            PendingImage::Stored { data_url, .. } | PendingImage::New { data_url } => data_url,
        }
    }
}

/// Field values as typed into the edit form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkerForm {
    pub title: String,
    pub address: String,
    pub notes: String,
    pub link: String,
    pub color: String,
    /// Category token; blank or unknown means no category.
    pub category: String,
}

impl MarkerForm {
    fn from_marker(marker: &Marker) -> Self {
        Self {
            title: marker.title.clone(),
            address: marker.address.clone(),
            notes: marker.notes.clone().unwrap_or_default(),
            link: marker.link.clone().unwrap_or_default(),
            color: marker.color.clone(),
            category: marker.category.map(|c| c.token().to_string()).unwrap_or_default(),
        }
    }

    fn into_patch(self) -> Result<MarkerPatch, TripError> {
        let title = require_text("title", &self.title)?;
        let color = optional_text(&self.color);
        Ok(MarkerPatch {
            title: Some(title),
            address: Some(self.address.trim().to_string()),
            notes: Some(optional_text(&self.notes)),
            link: Some(optional_text(&self.link)),
            color,
            category: Some(Category::from_token(&self.category)),
            ..Default::default()
        })
    }
}

pub struct MarkerEditor {
    marker_id: MarkerId,
    form: MarkerForm,
    pending: Vec<PendingImage>,
}

impl MarkerEditor {
    /// Starts editing a stored marker. `None` if the marker is unknown.
    pub fn open<B: BlobStore>(store: &EntityStore<B>, marker_id: MarkerId) -> Option<Self> {
        let marker = store.marker(marker_id)?;
        let pending = store
            .list_images(marker_id)
            .into_iter()
            .map(|img| PendingImage::Stored {
                id: img.id,
                data_url: img.data_url,
            })
            .collect();
        Some(Self {
            marker_id,
            form: MarkerForm::from_marker(marker),
            pending,
        })
    }

    pub fn marker_id(&self) -> MarkerId {
        self.marker_id
    }

    /// Form prefilled from the stored marker.
    pub fn form(&self) -> &MarkerForm {
        &self.form
    }

    pub fn pending(&self) -> &[PendingImage] {
        &self.pending
    }

    /// Adds a freshly read image to the end of the pending list.
    pub fn attach(&mut self, data_url: &str) -> Result<(), TripError> {
        data_url_mime(data_url)?;
        self.pending.push(PendingImage::New {
            data_url: data_url.to_string(),
        });
        Ok(())
    }

    /// Drops pending entry `index`. A stored image is deleted from the store
    /// immediately; returns `false` for an out-of-range index.
    pub fn remove<B: BlobStore>(
        &mut self,
        store: &mut EntityStore<B>,
        index: usize,
    ) -> Result<bool, TripError> {
        if index >= self.pending.len() {
            return Ok(false);
        }
        if let PendingImage::Stored { id, .. } = &self.pending[index] {
            store.delete_image(*id)?;
        }
        self.pending.remove(index);
        debug!("Removed pending image {index} of marker {}", self.marker_id);
        Ok(true)
    }

    /// Writes the form and the new images. The trip cover is recomputed when
    /// the marker ends up with any image. `Ok(None)` if the marker vanished.
    pub fn save<B: BlobStore>(
        &mut self,
        store: &mut EntityStore<B>,
        form: MarkerForm,
    ) -> Result<Option<Marker>, TripError> {
        let patch = form.clone().into_patch()?;
        let Some(marker) = store.update_marker(self.marker_id, patch)? else {
            return Ok(None);
        };

        for entry in self.pending.iter_mut() {
            if let PendingImage::New { data_url } = entry {
                let image = store.add_image(marker.id, data_url)?;
                *entry = PendingImage::Stored {
                    id: image.id,
                    data_url: image.data_url,
                };
            }
        }

        if store.image_count(marker.id) > 0 {
            store.recompute_trip_cover(marker.trip_id)?;
        }
        self.form = form;
        info!("Saved marker {} '{}'", marker.id, marker.title);
        Ok(Some(marker))
    }
}
