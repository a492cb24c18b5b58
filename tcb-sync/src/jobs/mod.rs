//! Job registry
//!
//! The five triggerable jobs: message sync and contact sync per provider,
//! plus the association reconciler. Each job runs at most once at a time;
//! a trigger landing during a run is skipped.

pub mod guard;

use crate::audit;
use crate::hubspot::{CrmGateway, HubSpotClient};
use crate::providers::{ClaroClient, SourceSystem, TigoClient};
use crate::sync::identity::{self, Candidate};
use crate::sync::{mapper, reconciler, Reconciler};
use chrono::TimeZone;
use guard::RunGuard;
use serde_json::json;
use std::sync::Arc;
use tcb_common::config::SyncConfig;
use tcb_common::{props, Error, PropertyMap, Result};
use tracing::{info, warn};

pub const JOB_SYNC_MESSAGES_TIGO: &str = "sync-messages-tigo";
pub const JOB_SYNC_MESSAGES_CLARO: &str = "sync-messages-claro";
pub const JOB_SYNC_CONTACTS_TIGO: &str = "sync-contacts-tigo";
pub const JOB_SYNC_CONTACTS_CLARO: &str = "sync-contacts-claro";
pub const JOB_ASSOCIATE: &str = "associate";

/// How a trigger resolved.
#[derive(Debug)]
pub enum JobOutcome {
    Completed(serde_json::Value),
    /// The job was already running; the trigger was dropped, not queued.
    Skipped { job: String },
}

pub struct JobRegistry {
    config: SyncConfig,
    client: Arc<HubSpotClient>,
    guards: [RunGuard; 5],
}

impl JobRegistry {
    pub fn new(config: SyncConfig, client: Arc<HubSpotClient>) -> Self {
        Self {
            config,
            client,
            guards: [
                RunGuard::new(JOB_SYNC_MESSAGES_TIGO),
                RunGuard::new(JOB_SYNC_MESSAGES_CLARO),
                RunGuard::new(JOB_SYNC_CONTACTS_TIGO),
                RunGuard::new(JOB_SYNC_CONTACTS_CLARO),
                RunGuard::new(JOB_ASSOCIATE),
            ],
        }
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.guards.iter().map(RunGuard::name).collect()
    }

    fn guard(&self, name: &str) -> Option<&RunGuard> {
        self.guards.iter().find(|g| g.name() == name)
    }

    /// Run a job by name. Unknown names error; a busy guard skips.
    pub async fn run(&self, name: &str) -> Result<JobOutcome> {
        let guard = self
            .guard(name)
            .ok_or_else(|| Error::NotFound(format!("unknown job {name:?}")))?;
        let Some(_token) = guard.try_acquire() else {
            info!(job = name, "Job already running; trigger skipped");
            return Ok(JobOutcome::Skipped {
                job: name.to_string(),
            });
        };

        info!(job = name, "Job started");
        let report = match name {
            JOB_SYNC_MESSAGES_TIGO => self.sync_messages(SourceSystem::Tigo).await?,
            JOB_SYNC_MESSAGES_CLARO => self.sync_messages(SourceSystem::Claro).await?,
            JOB_SYNC_CONTACTS_TIGO => self.sync_contacts(SourceSystem::Tigo).await?,
            JOB_SYNC_CONTACTS_CLARO => self.sync_contacts(SourceSystem::Claro).await?,
            JOB_ASSOCIATE => self.associate().await?,
            _ => return Err(Error::NotFound(format!("unknown job {name:?}"))),
        };
        info!(job = name, "Job finished");
        Ok(JobOutcome::Completed(report))
    }

    /// Pull provider messages for the configured window and upsert them
    /// into the messages object, keyed by the derived unique property.
    async fn sync_messages(&self, source: SourceSystem) -> Result<serde_json::Value> {
        let raw = match source {
            SourceSystem::Tigo => {
                TigoClient::new(self.config.tigo.clone())?
                    .list_messages(None)
                    .await?
            }
            SourceSystem::Claro => {
                ClaroClient::new(self.config.claro.clone())?
                    .list_messages()
                    .await?
            }
        };

        let hubspot = &self.config.hubspot;
        let mapped: Vec<PropertyMap> = raw
            .iter()
            .map(|m| mapper::map_message(m, source, hubspot, &self.config.country_code))
            .collect();
        let (records, duplicates_dropped) =
            mapper::dedupe_by_unique(mapped, &hubspot.message_unique_prop);

        let outcome = self
            .client
            .batch_upsert(
                &hubspot.messages_object,
                &hubspot.message_unique_prop,
                &records,
            )
            .await?;

        Ok(json!({
            "job": "sync-messages",
            "source": source.as_str(),
            "fetched": raw.len(),
            "duplicates_dropped": duplicates_dropped,
            "sent": outcome.sent,
            "failed": outcome.failed,
            "mode": outcome.mode,
        }))
    }

    /// Pull provider contacts, upsert them keyed by canonical phone, then
    /// run an identity pass over the whole contact object to repair records
    /// that still hold raw phone values.
    async fn sync_contacts(&self, source: SourceSystem) -> Result<serde_json::Value> {
        let raw = match source {
            SourceSystem::Tigo => TigoClient::new(self.config.tigo.clone())?.list_contacts().await?,
            SourceSystem::Claro => {
                ClaroClient::new(self.config.claro.clone())?.list_contacts().await?
            }
        };

        let hubspot = &self.config.hubspot;
        let mapped: Vec<PropertyMap> = raw
            .iter()
            .filter_map(|c| mapper::map_contact(c, source, hubspot, &self.config.country_code))
            .collect();
        let skipped_no_phone = raw.len() - mapped.len();
        let (records, duplicates_dropped) =
            mapper::dedupe_by_unique(mapped, &hubspot.contact_unique_prop);

        let outcome = self
            .client
            .batch_upsert(
                &hubspot.contacts_object,
                &hubspot.contact_unique_prop,
                &records,
            )
            .await?;

        let (repaired, clusters, cluster_report) = self.repair_identities().await?;

        Ok(json!({
            "job": "sync-contacts",
            "source": source.as_str(),
            "fetched": raw.len(),
            "skipped_no_phone": skipped_no_phone,
            "duplicates_dropped": duplicates_dropped,
            "sent": outcome.sent,
            "failed": outcome.failed,
            "mode": outcome.mode,
            "repaired": repaired,
            "duplicate_clusters": clusters,
            "cluster_report": cluster_report,
        }))
    }

    /// Identity pass over every contact in the portal; returns the repaired
    /// count, the cluster count, and the cluster report path when written.
    async fn repair_identities(&self) -> Result<(usize, usize, Option<String>)> {
        let unique_prop = self.config.hubspot.contact_unique_prop.as_str();
        let contacts = self
            .client
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

        let cluster_report = if plan.clusters.is_empty() {
            None
        } else {
            warn!(
                clusters = plan.clusters.len(),
                "Duplicate contacts detected during identity repair"
            );
            let path = audit::write_artifact(
                &self.config.data_dir,
                "duplicate-clusters",
                &serde_json::to_value(&plan.clusters)?,
            )?;
            Some(path.display().to_string())
        };

        let updates = reconciler::plan_updates(&plan, unique_prop);
        let repaired = if updates.is_empty() {
            0
        } else {
            self.client
                .batch_update(&self.config.hubspot.contacts_object, &updates)
                .await?
        };
        Ok((repaired, plan.clusters.len(), cluster_report))
    }

    async fn associate(&self) -> Result<serde_json::Value> {
        let summary = Reconciler::new(self.client.as_ref(), &self.config)
            .run()
            .await?;
        Ok(serde_json::to_value(summary)?)
    }
}
