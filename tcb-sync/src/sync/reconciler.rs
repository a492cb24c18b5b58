//! Message ↔ contact association reconciler
//!
//! Walks the full message object and guarantees that every message with a
//! usable phone number ends up associated to the contact owning that
//! number. Runs as a linear phase machine:
//!
//! indexing → identity resolution → contact ensuring → type resolution →
//! batch associating → done
//!
//! Identity resolution repairs contact records in place (canonical phone
//! and unique-identity property) so that later runs converge to a no-op.
//! Contacts missing for an indexed phone are synthesized with placeholder
//! names rather than dropped, because the portal rejects associations to
//! nothing and the business wants the message history visible either way.

use crate::hubspot::{AssociationOutcome, CrmGateway};
use crate::sync::identity::{self, Candidate, OwnershipMap, PlannedUpdate};
use crate::sync::mapper;
use chrono::TimeZone;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tcb_common::config::SyncConfig;
use tcb_common::{phone, props, Error, PropertyMap, Result};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::hubspot::RecordUpdate;

/// Reconciler phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Indexing,
    IdentityResolution,
    ContactEnsuring,
    TypeResolution,
    BatchAssociating,
    Done,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Indexing => "indexing",
            RunPhase::IdentityResolution => "identity_resolution",
            RunPhase::ContactEnsuring => "contact_ensuring",
            RunPhase::TypeResolution => "type_resolution",
            RunPhase::BatchAssociating => "batch_associating",
            RunPhase::Done => "done",
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters reported at the end of a reconciliation run. Emitted even when
/// the association phase runs out of retry budget partway through; in that
/// case `associations_remaining` lists what never got submitted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub messages_indexed: usize,
    pub distinct_phones: usize,
    /// Distinct phones whose canonical value is a lossy best-effort guess
    pub unverified_phones: usize,
    pub contacts_repaired: usize,
    pub contacts_created: usize,
    pub duplicate_clusters: usize,
    pub pairs_built: usize,
    pub associations_created: usize,
    pub associations_remaining: usize,
    pub skipped_no_phone: usize,
    pub skipped_no_contact: usize,
    /// Contacts owning a phone that no message references
    pub skipped_no_message: usize,
}

/// Everything indexed for one canonical phone.
#[derive(Debug, Default)]
struct PhoneEntry {
    message_ids: Vec<String>,
    /// First company tag seen on this phone's messages
    company: Option<String>,
    /// False when any occurrence normalized through the lossy fallback
    verified: bool,
}

pub struct Reconciler<'a, G: CrmGateway> {
    gateway: &'a G,
    config: &'a SyncConfig,
}

impl<'a, G: CrmGateway> Reconciler<'a, G> {
    pub fn new(gateway: &'a G, config: &'a SyncConfig) -> Self {
        Self { gateway, config }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let mut summary = RunSummary {
            run_id: run_id.to_string(),
            ..RunSummary::default()
        };

        info!(%run_id, phase = %RunPhase::Indexing, "Reconciliation run started");
        let index = self
            .index_messages(&mut summary)
            .await
            .map_err(|e| phase_failure(run_id, RunPhase::Indexing, e))?;
        if index.is_empty() {
            info!(%run_id, phase = %RunPhase::Done, "No messages carry a usable phone; nothing to do");
            return Ok(summary);
        }
        summary.distinct_phones = index.len();

        info!(%run_id, phase = %RunPhase::IdentityResolution, phones = index.len(), "Resolving phone ownership");
        let mut ownership = self
            .resolve_identities(&mut summary)
            .await
            .map_err(|e| phase_failure(run_id, RunPhase::IdentityResolution, e))?;
        summary.skipped_no_message = ownership
            .keys()
            .filter(|phone| !index.contains_key(*phone))
            .count();

        info!(%run_id, phase = %RunPhase::ContactEnsuring, "Ensuring a contact exists per phone");
        let contact_ids = self
            .ensure_contacts(&index, &mut ownership, &mut summary)
            .await
            .map_err(|e| phase_failure(run_id, RunPhase::ContactEnsuring, e))?;

        let mut pairs: BTreeSet<(String, String)> = BTreeSet::new();
        for (canonical, entry) in &index {
            let Some(contact_id) = contact_ids.get(canonical) else {
                summary.skipped_no_contact += entry.message_ids.len();
                continue;
            };
            for message_id in &entry.message_ids {
                pairs.insert((message_id.clone(), contact_id.clone()));
            }
        }
        summary.pairs_built = pairs.len();
        if pairs.is_empty() {
            info!(%run_id, phase = %RunPhase::Done, "No associable pairs in this run");
            return Ok(summary);
        }

        info!(%run_id, phase = %RunPhase::TypeResolution, "Resolving association type");
        let assoc = self
            .gateway
            .resolve_association_type(
                &self.config.hubspot.messages_object,
                &self.config.hubspot.contacts_object,
            )
            .await
            .map_err(|e| phase_failure(run_id, RunPhase::TypeResolution, e))?;

        // The portal may only define the label in the contact → message
        // direction; mirror every pair before submission.
        let submit: Vec<(String, String)> = if assoc.reversed {
            pairs.into_iter().map(|(m, c)| (c, m)).collect()
        } else {
            pairs.into_iter().collect()
        };

        info!(%run_id, phase = %RunPhase::BatchAssociating, pairs = submit.len(), reversed = assoc.reversed, "Submitting associations");
        // A run that exhausts the retry budget here still reports its
        // counts; only non-rate-limit failures abort it.
        let outcome = match self.gateway.create_associations(&assoc, &submit).await {
            Ok(outcome) => outcome,
            Err(Error::RateLimited { context }) => {
                warn!(%run_id, context, "Rate limited before any association batch went through");
                AssociationOutcome {
                    created: 0,
                    remaining: submit.len(),
                }
            }
            Err(e) => return Err(phase_failure(run_id, RunPhase::BatchAssociating, e)),
        };
        summary.associations_created = outcome.created;
        summary.associations_remaining = outcome.remaining;
        if summary.associations_remaining > 0 {
            warn!(
                %run_id,
                created = summary.associations_created,
                remaining = summary.associations_remaining,
                "Run finished partially; remaining pairs will be retried next run"
            );
        }

        info!(
            %run_id,
            phase = %RunPhase::Done,
            messages = summary.messages_indexed,
            phones = summary.distinct_phones,
            created = summary.associations_created,
            remaining = summary.associations_remaining,
            skipped_no_phone = summary.skipped_no_phone,
            skipped_no_contact = summary.skipped_no_contact,
            skipped_no_message = summary.skipped_no_message,
            "Reconciliation run finished"
        );
        Ok(summary)
    }

    /// Phase 1: walk every message and bucket ids by canonical phone.
    async fn index_messages(
        &self,
        summary: &mut RunSummary,
    ) -> Result<BTreeMap<String, PhoneEntry>> {
        let messages = self
            .gateway
            .fetch_all(
                &self.config.hubspot.messages_object,
                &[mapper::PROP_NUMERO, mapper::PROP_COMPANIA],
            )
            .await?;
        summary.messages_indexed = messages.len();

        let mut index: BTreeMap<String, PhoneEntry> = BTreeMap::new();
        for message in &messages {
            let canonical = message
                .prop(mapper::PROP_NUMERO)
                .and_then(|raw| phone::normalize(raw, &self.config.country_code));
            let Some(canonical) = canonical else {
                summary.skipped_no_phone += 1;
                continue;
            };
            let entry = index.entry(canonical.e164).or_insert_with(|| PhoneEntry {
                verified: true,
                ..PhoneEntry::default()
            });
            entry.verified &= canonical.verified;
            entry.message_ids.push(message.id.clone());
            if entry.company.is_none() {
                entry.company = message.prop(mapper::PROP_COMPANIA).map(str::to_string);
            }
        }
        summary.unverified_phones = index.values().filter(|e| !e.verified).count();
        Ok(index)
    }

    /// Phase 2: load all contacts, repair non-canonical phone identity in
    /// place, and return the resulting phone → contact-id ownership map.
    async fn resolve_identities(&self, summary: &mut RunSummary) -> Result<OwnershipMap> {
        let unique_prop = self.config.hubspot.contact_unique_prop.as_str();
        let contacts = self
            .gateway
            .fetch_all(
                &self.config.hubspot.contacts_object,
                &[unique_prop, props::PROP_PHONE, "createdate"],
            )
            .await?;

        let candidates: Vec<Candidate> = contacts
            .iter()
            .map(|c| Candidate {
                id: c.id.clone(),
                unique_value: c.prop(unique_prop).unwrap_or_default().to_string(),
                raw_phone: c.prop(props::PROP_PHONE).unwrap_or_default().to_string(),
                created_at: c
                    .prop("createdate")
                    .and_then(mapper::to_epoch_ms)
                    .and_then(|ms| chrono::Utc.timestamp_millis_opt(ms).single()),
            })
            .collect();

        let mut ownership = identity::seed_ownership(&candidates);
        let plan = identity::resolve(&candidates, &self.config.country_code, &mut ownership);
        summary.duplicate_clusters = plan.clusters.len();
        for cluster in &plan.clusters {
            warn!(
                phone = %cluster.target,
                winner = %cluster.winner_id,
                losers = cluster.loser_ids.len(),
                "Duplicate contacts collided on one phone"
            );
        }

        let updates = plan_updates(&plan, unique_prop);
        if !updates.is_empty() {
            summary.contacts_repaired = self
                .gateway
                .batch_update(&self.config.hubspot.contacts_object, &updates)
                .await?;
        }

        Ok(ownership)
    }

    /// Phase 3: synthesize contacts for phones no contact owns, then map
    /// every indexed phone to a contact id.
    async fn ensure_contacts(
        &self,
        index: &BTreeMap<String, PhoneEntry>,
        ownership: &mut OwnershipMap,
        summary: &mut RunSummary,
    ) -> Result<HashMap<String, String>> {
        let mut contact_ids: HashMap<String, String> = HashMap::new();
        let mut missing: Vec<&str> = Vec::new();
        for canonical in index.keys() {
            match ownership.owner_of(canonical) {
                Some(id) => {
                    contact_ids.insert(canonical.clone(), id.to_string());
                }
                None => missing.push(canonical.as_str()),
            }
        }
        if missing.is_empty() {
            return Ok(contact_ids);
        }

        let orphans: Vec<PropertyMap> = missing
            .iter()
            .map(|canonical| {
                orphan_properties(
                    canonical,
                    index
                        .get(*canonical)
                        .and_then(|e| e.company.as_deref())
                        .or(self.config.default_company.as_deref()),
                    &self.config.hubspot.contact_unique_prop,
                )
            })
            .collect();

        info!(count = orphans.len(), "Creating placeholder contacts for unowned phones");
        let outcome = self
            .gateway
            .batch_upsert(
                &self.config.hubspot.contacts_object,
                &self.config.hubspot.contact_unique_prop,
                &orphans,
            )
            .await?;
        summary.contacts_created = outcome.sent;

        // Re-read the ids the portal assigned; in dry-run mode nothing was
        // written, so these phones stay unmapped and count as skipped.
        let values: Vec<String> = missing.iter().map(|s| s.to_string()).collect();
        let created = self
            .gateway
            .read_ids_by_unique(
                &self.config.hubspot.contacts_object,
                &self.config.hubspot.contact_unique_prop,
                &values,
            )
            .await?;
        for (canonical, id) in created {
            ownership.claim(canonical.clone(), id.clone());
            contact_ids.insert(canonical, id);
        }
        Ok(contact_ids)
    }
}

/// Log a fatal run failure with the phase it died in, then pass it on.
fn phase_failure(run_id: Uuid, phase: RunPhase, e: Error) -> Error {
    error!(%run_id, phase = %phase, error = %e, "Reconciliation phase failed");
    e
}

/// Turn a resolution plan into CRM record updates: owners get the unique
/// property and both display phones, losers get display phones only.
pub(crate) fn plan_updates(
    plan: &identity::ResolutionPlan,
    unique_prop: &str,
) -> Vec<RecordUpdate> {
    let update = |planned: &PlannedUpdate, set_unique: bool| {
        let mut properties = PropertyMap::new()
            .with(props::PROP_PHONE, &planned.canonical)
            .with(props::PROP_MOBILE_PHONE, &planned.canonical);
        if set_unique {
            properties.insert(unique_prop, &planned.canonical);
        }
        RecordUpdate {
            id: planned.id.clone(),
            properties,
        }
    };
    plan.set_both
        .iter()
        .map(|u| update(u, true))
        .chain(plan.set_phone_only.iter().map(|u| update(u, false)))
        .collect()
}

/// Property bag for a placeholder contact owning `canonical`.
pub(crate) fn orphan_properties(
    canonical: &str,
    company: Option<&str>,
    unique_prop: &str,
) -> PropertyMap {
    let digits = phone::only_digits(canonical);
    let name = mapper::placeholder_name(&digits);
    let mut properties = PropertyMap::new()
        .with(unique_prop, canonical)
        .with(props::PROP_PHONE, canonical)
        .with(props::PROP_MOBILE_PHONE, canonical)
        .with("firstname", &name)
        .with("lastname", &name);
    if let Some(company) = company {
        properties.insert(mapper::PROP_COMPANIA, company);
    }
    properties
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_render_in_machine_order() {
        let order = [
            RunPhase::Indexing,
            RunPhase::IdentityResolution,
            RunPhase::ContactEnsuring,
            RunPhase::TypeResolution,
            RunPhase::BatchAssociating,
            RunPhase::Done,
        ];
        let names: Vec<&str> = order.iter().map(RunPhase::as_str).collect();
        assert_eq!(
            names,
            vec![
                "indexing",
                "identity_resolution",
                "contact_ensuring",
                "type_resolution",
                "batch_associating",
                "done"
            ]
        );
    }

    #[test]
    fn orphan_contacts_carry_placeholder_identity() {
        let props = orphan_properties(
            "+50242183669",
            Some("Tigo"),
            "numero_telefono_id_unico",
        );
        assert_eq!(props.get("numero_telefono_id_unico"), Some("+50242183669"));
        assert_eq!(props.phone(), Some("+50242183669"));
        assert_eq!(props.get("mobilephone"), Some("+50242183669"));
        assert_eq!(props.get("firstname"), Some("nombre_vacio_50242183669"));
        assert_eq!(props.get("lastname"), Some("nombre_vacio_50242183669"));
        assert_eq!(props.get("compania"), Some("Tigo"));

        let bare = orphan_properties("+50242183669", None, "numero_telefono_id_unico");
        assert_eq!(bare.get("compania"), None);
    }
}
