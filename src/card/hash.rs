use crate::shopify::ProductSnapshot;
use sha2::{Digest, Sha256};

/// Exactly the record fields the card renders, captured as the raw stored
/// values. Changing any of them must change the hash; nothing else may.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardContent {
    pub title: String,
    pub price: String,
    pub description: String,
    pub location: String,
    pub state: String,
    pub age_statement: String,
    pub abv: String,
    pub sub_type: String,
    pub nose: String,
    pub palate: String,
    pub finish: String,
}

impl CardContent {
    pub fn from_snapshot(snapshot: &ProductSnapshot) -> Self {
        let mf = |key: &str| snapshot.metafield(key).unwrap_or_default().to_string();
        Self {
            title: snapshot.title.clone(),
            price: snapshot.price.clone().unwrap_or_default(),
            description: snapshot.description_html.clone(),
            location: mf("custom.location_"),
            state: mf("custom.state"),
            age_statement: mf("custom.age_statement"),
            abv: mf("custom.alcohol_by_volume"),
            sub_type: mf("custom.sub_type"),
            nose: mf("custom.nose"),
            palate: mf("custom.palate"),
            finish: mf("custom.finish"),
        }
    }

    /// Hex SHA-256 over the fields in declaration order, joined with a
    /// unit separator so adjacent fields cannot collide.
    pub fn content_hash(&self) -> String {
        let preimage = [
            self.title.as_str(),
            self.price.as_str(),
            self.description.as_str(),
            self.location.as_str(),
            self.state.as_str(),
            self.age_statement.as_str(),
            self.abv.as_str(),
            self.sub_type.as_str(),
            self.nose.as_str(),
            self.palate.as_str(),
            self.finish.as_str(),
        ]
        .join("\u{1f}");
        let mut hasher = Sha256::new();
        hasher.update(preimage.as_bytes());
        hex::encode(hasher.finalize())
    }
}
