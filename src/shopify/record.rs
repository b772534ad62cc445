use crate::shopify::metafields::MetafieldWriteReport;
use crate::shopify::product::CreatedProduct;
use crate::shopify::publish::PublishReport;
use serde::Serialize;
use thiserror::Error;

/// Where a commerce record stands in its run. Transitions are forward-only
/// and single-step; a record is never rolled back, only left behind with
/// warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Uncreated,
    Created,
    MetafieldsReconciled,
    Published,
}

impl RecordState {
    pub fn can_advance_to(self, next: RecordState) -> bool {
        matches!(
            (self, next),
            (RecordState::Uncreated, RecordState::Created)
                | (RecordState::Created, RecordState::MetafieldsReconciled)
                | (RecordState::MetafieldsReconciled, RecordState::Published)
        )
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("record cannot move from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: RecordState,
    pub to: RecordState,
}

/// One commerce record being driven through a run. Each step hands over
/// the evidence for its transition, so state and data cannot drift apart.
#[derive(Debug)]
pub struct ProductRecord {
    state: RecordState,
    product: Option<CreatedProduct>,
    metafields: Option<MetafieldWriteReport>,
    publish: Option<PublishReport>,
}

impl ProductRecord {
    pub fn new() -> Self {
        Self {
            state: RecordState::Uncreated,
            product: None,
            metafields: None,
            publish: None,
        }
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn product(&self) -> Option<&CreatedProduct> {
        self.product.as_ref()
    }

    pub fn metafield_report(&self) -> Option<&MetafieldWriteReport> {
        self.metafields.as_ref()
    }

    pub fn publish_report(&self) -> Option<&PublishReport> {
        self.publish.as_ref()
    }

    pub fn mark_created(&mut self, product: CreatedProduct) -> Result<(), InvalidTransition> {
        self.advance(RecordState::Created)?;
        self.product = Some(product);
        Ok(())
    }

    pub fn mark_metafields_reconciled(
        &mut self,
        report: MetafieldWriteReport,
    ) -> Result<(), InvalidTransition> {
        self.advance(RecordState::MetafieldsReconciled)?;
        self.metafields = Some(report);
        Ok(())
    }

    pub fn mark_published(&mut self, report: PublishReport) -> Result<(), InvalidTransition> {
        self.advance(RecordState::Published)?;
        self.publish = Some(report);
        Ok(())
    }

    fn advance(&mut self, to: RecordState) -> Result<(), InvalidTransition> {
        if !self.state.can_advance_to(to) {
            return Err(InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

impl Default for ProductRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_product() -> CreatedProduct {
        CreatedProduct {
            id: 42,
            title: "Benchmark Test Bourbon".into(),
            handle: "benchmark-test-bourbon".into(),
            admin_url: "https://admin.shopify.com/store/rickhouse/products/42".into(),
        }
    }

    fn clean_metafields() -> MetafieldWriteReport {
        MetafieldWriteReport {
            written: vec!["nose".into()],
            failed: Vec::new(),
            rounds: 1,
        }
    }

    #[test]
    fn record_walks_the_full_lifecycle() {
        let mut record = ProductRecord::new();
        assert_eq!(record.state(), RecordState::Uncreated);
        assert!(record.product().is_none());

        record.mark_created(sample_product()).unwrap();
        assert_eq!(record.state(), RecordState::Created);
        assert_eq!(record.product().unwrap().id, 42);

        record.mark_metafields_reconciled(clean_metafields()).unwrap();
        assert_eq!(record.state(), RecordState::MetafieldsReconciled);
        assert_eq!(record.metafield_report().unwrap().rounds, 1);

        record.mark_published(PublishReport::default()).unwrap();
        assert_eq!(record.state(), RecordState::Published);
        assert!(record.publish_report().is_some());
    }

    #[test]
    fn steps_cannot_be_skipped() {
        let mut record = ProductRecord::new();
        let err = record.mark_metafields_reconciled(clean_metafields()).unwrap_err();
        assert_eq!(err.from, RecordState::Uncreated);
        assert_eq!(err.to, RecordState::MetafieldsReconciled);

        record.mark_created(sample_product()).unwrap();
        let err = record.mark_published(PublishReport::default()).unwrap_err();
        assert_eq!(err.from, RecordState::Created);
    }

    #[test]
    fn a_record_is_created_once() {
        let mut record = ProductRecord::new();
        record.mark_created(sample_product()).unwrap();
        assert!(record.mark_created(sample_product()).is_err());
    }

    #[test]
    fn transitions_are_forward_only() {
        assert!(RecordState::Uncreated.can_advance_to(RecordState::Created));
        assert!(!RecordState::Created.can_advance_to(RecordState::Uncreated));
        assert!(!RecordState::Uncreated.can_advance_to(RecordState::Published));
        assert!(!RecordState::Published.can_advance_to(RecordState::Published));
    }
}
