//! Association type resolution and edge creation
//!
//! HubSpot only exposes an association label in one direction between two
//! object types, and which direction varies by portal. Resolution probes
//! A→B first, then B→A; when only the reverse carries a label the returned
//! type is flagged `reversed` and callers must mirror every `(from, to)`
//! pair before submission.

use super::client::HubSpotClient;
use super::gateway::{AssociationOutcome, AssociationType};
use super::types::{AssocCreateInput, AssocCreateResults, AssocEndpoint, AssociationLabel, BatchInputs, LabelList};
use crate::audit;
use serde_json::json;
use tcb_common::{Error, Result};
use tracing::{debug, info, warn};

impl HubSpotClient {
    /// Resolve the association type id and valid direction between two
    /// object types. With a configured forced type id the label probe is
    /// skipped and the forward direction is assumed.
    pub async fn resolve_association(
        &self,
        from_object: &str,
        to_object: &str,
    ) -> Result<AssociationType> {
        let from_type_id = self.resolve_object_type_id(from_object).await?;
        let to_type_id = self.resolve_object_type_id(to_object).await?;

        if let Some(type_id) = self.config().hubspot.forced_assoc_type_id {
            info!(type_id, "Using forced association type id");
            return Ok(AssociationType {
                type_id,
                from_type_id,
                to_type_id,
                reversed: false,
            });
        }

        let preferred = self.config().hubspot.preferred_assoc_label.as_deref();

        let forward = self.fetch_labels(&from_type_id, &to_type_id).await?;
        if let Some(label) = pick_label(&forward, preferred) {
            debug!(
                from = %from_type_id,
                to = %to_type_id,
                type_id = label.type_id,
                label = label.display(),
                "Association label resolved (forward)"
            );
            return Ok(AssociationType {
                type_id: label.type_id.unwrap_or_default(),
                from_type_id,
                to_type_id,
                reversed: false,
            });
        }

        let reverse = self.fetch_labels(&to_type_id, &from_type_id).await?;
        if let Some(label) = pick_label(&reverse, preferred) {
            debug!(
                from = %to_type_id,
                to = %from_type_id,
                type_id = label.type_id,
                label = label.display(),
                "Association label resolved (reversed)"
            );
            return Ok(AssociationType {
                type_id: label.type_id.unwrap_or_default(),
                from_type_id: to_type_id,
                to_type_id: from_type_id,
                reversed: true,
            });
        }

        Err(Error::AssociationLabelMissing {
            from: from_object.to_string(),
            to: to_object.to_string(),
        })
    }

    async fn fetch_labels(&self, from_id: &str, to_id: &str) -> Result<Vec<AssociationLabel>> {
        let path = format!("/crm/v4/associations/{from_id}/{to_id}/labels");
        let list: LabelList = self.get_json(&path, &[], "assoc-labels").await?;
        Ok(list.results)
    }

    /// Create association edges in batches, in the direction the resolved
    /// type prescribes. Pairs are submitted as given; direction mirroring is
    /// the caller's responsibility. When the retry budget runs out mid-run
    /// the outcome reports what was created and what remains unsubmitted
    /// instead of erroring, so the run's counts survive.
    pub async fn create_associations(
        &self,
        assoc: &AssociationType,
        pairs: &[(String, String)],
    ) -> Result<AssociationOutcome> {
        if pairs.is_empty() {
            return Ok(AssociationOutcome::complete(0));
        }

        let inputs: Vec<AssocCreateInput> = pairs
            .iter()
            .map(|(from, to)| AssocCreateInput {
                from: AssocEndpoint { id: from.clone() },
                to: AssocEndpoint { id: to.clone() },
                type_id: assoc.type_id,
            })
            .collect();

        if self.dry_run() {
            audit::write_artifact(
                &self.config().data_dir,
                "associations",
                &json!({
                    "fromTypeId": assoc.from_type_id,
                    "toTypeId": assoc.to_type_id,
                    "inputs": inputs,
                }),
            )?;
            info!(count = inputs.len(), "Dry run: association payload saved");
            return Ok(AssociationOutcome::complete(inputs.len()));
        }

        let path = format!(
            "/crm/v4/associations/{}/{}/batch/create",
            assoc.from_type_id, assoc.to_type_id
        );
        let mut created = 0;
        let mut submitted = 0;
        for chunk in inputs.chunks(self.config().batch_size.max(1)) {
            let body = BatchInputs {
                inputs: chunk.to_vec(),
            };
            match self
                .post_json::<AssocCreateResults>(&path, &body, "assoc-create")
                .await
            {
                Ok(results) => {
                    created += results.results.len();
                    submitted += chunk.len();
                    debug!(created, total = pairs.len(), "Association batch created");
                    self.batch_pause().await;
                }
                Err(Error::RateLimited { context }) => {
                    warn!(
                        context,
                        created,
                        remaining = pairs.len() - submitted,
                        "Rate-limit retries exhausted; finishing the run with partial associations"
                    );
                    return Ok(AssociationOutcome {
                        created,
                        remaining: pairs.len() - submitted,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(AssociationOutcome::complete(created))
    }
}

/// First label with a usable type id, unless a preferred label name matches.
fn pick_label<'a>(
    labels: &'a [AssociationLabel],
    preferred: Option<&str>,
) -> Option<&'a AssociationLabel> {
    let usable: Vec<&AssociationLabel> = labels.iter().filter(|l| l.type_id.is_some()).collect();
    if usable.is_empty() {
        return None;
    }
    if let Some(want) = preferred {
        let want = want.trim().to_lowercase();
        if let Some(hit) = usable
            .iter()
            .find(|l| l.display().trim().to_lowercase() == want)
        {
            return Some(hit);
        }
    }
    usable.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(id: Option<i64>, name: &str) -> AssociationLabel {
        AssociationLabel {
            type_id: id,
            label: Some(name.to_string()),
            name: None,
        }
    }

    #[test]
    fn first_usable_label_wins_without_preference() {
        let labels = vec![label(None, "broken"), label(Some(5), "SMS"), label(Some(9), "Other")];
        assert_eq!(pick_label(&labels, None).unwrap().type_id, Some(5));
    }

    #[test]
    fn preferred_label_overrides_order() {
        let labels = vec![label(Some(5), "SMS"), label(Some(9), "Mensaje")];
        assert_eq!(
            pick_label(&labels, Some("mensaje")).unwrap().type_id,
            Some(9)
        );
        // Unknown preference falls back to the first usable label
        assert_eq!(pick_label(&labels, Some("nope")).unwrap().type_id, Some(5));
    }

    #[test]
    fn no_usable_labels_yields_none() {
        assert!(pick_label(&[], None).is_none());
        assert!(pick_label(&[label(None, "x")], None).is_none());
    }
}
