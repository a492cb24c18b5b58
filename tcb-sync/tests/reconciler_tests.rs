//! Reconciler runs against a scripted CRM gateway.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tcb_common::config::SyncConfig;
use tcb_common::{Error, PropertyMap, Result};
use tcb_sync::hubspot::types::HsRecord;
use tcb_sync::hubspot::{
    AssociationOutcome, AssociationType, CrmGateway, RecordUpdate, UpsertMode, UpsertOutcome,
};
use tcb_sync::sync::Reconciler;

fn record(id: &str, props: &[(&str, &str)]) -> HsRecord {
    HsRecord {
        id: id.to_string(),
        properties: props
            .iter()
            .map(|(k, v)| (k.to_string(), Some(v.to_string())))
            .collect::<BTreeMap<_, _>>(),
    }
}

#[derive(Default)]
struct MockState {
    upserted: Vec<PropertyMap>,
    updates: Vec<RecordUpdate>,
    pairs: Vec<(String, String)>,
    assigned: HashMap<String, String>,
    next_id: usize,
}

/// Scripted gateway: fixed message/contact listings, ids assigned on
/// upsert, everything submitted recorded for assertions.
struct MockGateway {
    messages: Vec<HsRecord>,
    contacts: Vec<HsRecord>,
    reversed: bool,
    /// When false, upserts "succeed" but no ids become readable, which is
    /// what a dry run looks like to the reconciler.
    assign_ids: bool,
    /// Commit only this many pairs, reporting the rest as remaining
    partial_after: Option<usize>,
    /// Answer every association submission with exhausted retries
    rate_limit_associations: bool,
    /// No association label in either direction
    missing_label: bool,
    state: Mutex<MockState>,
}

impl MockGateway {
    fn new(messages: Vec<HsRecord>, contacts: Vec<HsRecord>) -> Self {
        Self {
            messages,
            contacts,
            reversed: false,
            assign_ids: true,
            partial_after: None,
            rate_limit_associations: false,
            missing_label: false,
            state: Mutex::new(MockState::default()),
        }
    }
}

#[async_trait]
impl CrmGateway for MockGateway {
    async fn fetch_all(&self, object_type: &str, _properties: &[&str]) -> Result<Vec<HsRecord>> {
        if object_type == "contacts" {
            Ok(self.contacts.clone())
        } else {
            Ok(self.messages.clone())
        }
    }

    async fn read_ids_by_unique(
        &self,
        _object_type: &str,
        _id_property: &str,
        values: &[String],
    ) -> Result<HashMap<String, String>> {
        let state = self.state.lock().unwrap();
        Ok(values
            .iter()
            .filter_map(|v| state.assigned.get(v).map(|id| (v.clone(), id.clone())))
            .collect())
    }

    async fn batch_upsert(
        &self,
        _object_type: &str,
        id_property: &str,
        records: &[PropertyMap],
    ) -> Result<UpsertOutcome> {
        let mut state = self.state.lock().unwrap();
        for r in records {
            state.upserted.push(r.clone());
            if self.assign_ids {
                if let Some(unique) = r.unique_value(id_property) {
                    let unique = unique.to_string();
                    state.next_id += 1;
                    let id = format!("c{}", state.next_id);
                    state.assigned.insert(unique, id);
                }
            }
        }
        Ok(UpsertOutcome {
            sent: records.len(),
            failed: 0,
            mode: UpsertMode::Batch,
        })
    }

    async fn batch_update(&self, _object_type: &str, updates: &[RecordUpdate]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.updates.extend(updates.iter().cloned());
        Ok(updates.len())
    }

    async fn resolve_association_type(
        &self,
        _from_object: &str,
        _to_object: &str,
    ) -> Result<AssociationType> {
        if self.missing_label {
            return Err(Error::AssociationLabelMissing {
                from: "p_mensajes".to_string(),
                to: "contacts".to_string(),
            });
        }
        Ok(AssociationType {
            type_id: 42,
            from_type_id: "2-123".to_string(),
            to_type_id: "0-1".to_string(),
            reversed: self.reversed,
        })
    }

    async fn create_associations(
        &self,
        _assoc: &AssociationType,
        pairs: &[(String, String)],
    ) -> Result<AssociationOutcome> {
        if self.rate_limit_associations {
            return Err(Error::RateLimited {
                context: "assoc-create after 9 attempts".to_string(),
            });
        }
        let take = self.partial_after.unwrap_or(pairs.len()).min(pairs.len());
        let mut state = self.state.lock().unwrap();
        state.pairs.extend(pairs[..take].iter().cloned());
        Ok(AssociationOutcome {
            created: take,
            remaining: pairs.len() - take,
        })
    }
}

#[tokio::test]
async fn orphan_contact_is_synthesized_and_associated() {
    // A message references a phone no contact owns.
    let gateway = MockGateway::new(
        vec![record("m1", &[("numero", "+50259515736"), ("compania", "Tigo")])],
        vec![],
    );
    let config = SyncConfig::default();

    let summary = Reconciler::new(&gateway, &config).run().await.unwrap();
    assert_eq!(summary.messages_indexed, 1);
    assert_eq!(summary.distinct_phones, 1);
    assert_eq!(summary.contacts_created, 1);
    assert_eq!(summary.pairs_built, 1);
    assert_eq!(summary.associations_created, 1);
    assert_eq!(summary.skipped_no_contact, 0);

    let state = gateway.state.lock().unwrap();
    let orphan = &state.upserted[0];
    assert_eq!(orphan.get("numero_telefono_id_unico"), Some("+50259515736"));
    assert_eq!(orphan.get("firstname"), Some("nombre_vacio_50259515736"));
    assert_eq!(orphan.get("compania"), Some("Tigo"));
    // Message first, contact second in the default direction.
    assert_eq!(state.pairs, vec![("m1".to_string(), "c1".to_string())]);
}

#[tokio::test]
async fn existing_contact_is_reused_without_creation() {
    let gateway = MockGateway::new(
        vec![record("m1", &[("numero", "42183669")])],
        vec![record(
            "c9",
            &[
                ("numero_telefono_id_unico", "+50242183669"),
                ("phone", "+50242183669"),
            ],
        )],
    );
    let config = SyncConfig::default();

    let summary = Reconciler::new(&gateway, &config).run().await.unwrap();
    assert_eq!(summary.contacts_created, 0);
    assert_eq!(summary.associations_created, 1);

    let state = gateway.state.lock().unwrap();
    assert!(state.upserted.is_empty());
    assert_eq!(state.pairs, vec![("m1".to_string(), "c9".to_string())]);
}

#[tokio::test]
async fn raw_contact_identity_is_repaired_and_owns_the_phone() {
    // The contact holds the number in raw national form; identity
    // resolution canonicalizes it in place instead of creating an orphan.
    let gateway = MockGateway::new(
        vec![record("m1", &[("numero", "+50242183669")])],
        vec![record(
            "c3",
            &[("numero_telefono_id_unico", "42183669"), ("phone", "42183669")],
        )],
    );
    let config = SyncConfig::default();

    let summary = Reconciler::new(&gateway, &config).run().await.unwrap();
    assert_eq!(summary.contacts_repaired, 1);
    assert_eq!(summary.contacts_created, 0);
    assert_eq!(summary.associations_created, 1);

    let state = gateway.state.lock().unwrap();
    assert_eq!(state.updates.len(), 1);
    assert_eq!(state.updates[0].id, "c3");
    assert_eq!(
        state.updates[0].properties.get("numero_telefono_id_unico"),
        Some("+50242183669")
    );
    assert_eq!(state.pairs, vec![("m1".to_string(), "c3".to_string())]);
}

#[tokio::test]
async fn duplicate_pairs_are_submitted_once() {
    // The same message record indexed twice and two messages on one phone.
    let gateway = MockGateway::new(
        vec![
            record("m1", &[("numero", "59515736")]),
            record("m1", &[("numero", "5951-5736")]),
            record("m2", &[("numero", "+50259515736")]),
        ],
        vec![record(
            "c1",
            &[
                ("numero_telefono_id_unico", "+50259515736"),
                ("phone", "+50259515736"),
            ],
        )],
    );
    let config = SyncConfig::default();

    let summary = Reconciler::new(&gateway, &config).run().await.unwrap();
    assert_eq!(summary.messages_indexed, 3);
    assert_eq!(summary.distinct_phones, 1);
    assert_eq!(summary.pairs_built, 2);
    assert_eq!(summary.associations_created, 2);
}

#[tokio::test]
async fn reversed_label_mirrors_every_pair() {
    let mut gateway = MockGateway::new(
        vec![record("m1", &[("numero", "+50259515736")])],
        vec![record(
            "c1",
            &[
                ("numero_telefono_id_unico", "+50259515736"),
                ("phone", "+50259515736"),
            ],
        )],
    );
    gateway.reversed = true;
    let config = SyncConfig::default();

    let summary = Reconciler::new(&gateway, &config).run().await.unwrap();
    assert_eq!(summary.associations_created, 1);

    let state = gateway.state.lock().unwrap();
    // Contact first when only the reverse direction carries the label.
    assert_eq!(state.pairs, vec![("c1".to_string(), "m1".to_string())]);
}

#[tokio::test]
async fn unusable_phones_and_unmapped_contacts_are_counted() {
    let mut gateway = MockGateway::new(
        vec![
            record("m1", &[("numero", "")]),
            record("m2", &[]),
            record("m3", &[("numero", "59515736")]),
        ],
        vec![],
    );
    // Upsert succeeds but ids never become readable: the dry-run shape.
    gateway.assign_ids = false;
    let config = SyncConfig::default();

    let summary = Reconciler::new(&gateway, &config).run().await.unwrap();
    assert_eq!(summary.messages_indexed, 3);
    assert_eq!(summary.skipped_no_phone, 2);
    assert_eq!(summary.distinct_phones, 1);
    assert_eq!(summary.contacts_created, 1);
    assert_eq!(summary.skipped_no_contact, 1);
    assert_eq!(summary.pairs_built, 0);
    assert_eq!(summary.associations_created, 0);
}

#[tokio::test]
async fn retry_exhaustion_mid_run_keeps_partial_counts() {
    // Two pairs to submit; the gateway commits one batch and then runs out
    // of retry budget. The run must still finish and report both sides.
    let mut gateway = MockGateway::new(
        vec![
            record("m1", &[("numero", "+50259515736")]),
            record("m2", &[("numero", "+50242183669")]),
        ],
        vec![
            record(
                "c1",
                &[
                    ("numero_telefono_id_unico", "+50259515736"),
                    ("phone", "+50259515736"),
                ],
            ),
            record(
                "c2",
                &[
                    ("numero_telefono_id_unico", "+50242183669"),
                    ("phone", "+50242183669"),
                ],
            ),
        ],
    );
    gateway.partial_after = Some(1);
    let config = SyncConfig::default();

    let summary = Reconciler::new(&gateway, &config).run().await.unwrap();
    assert_eq!(summary.messages_indexed, 2);
    assert_eq!(summary.pairs_built, 2);
    assert_eq!(summary.associations_created, 1);
    assert_eq!(summary.associations_remaining, 1);
    assert_eq!(gateway.state.lock().unwrap().pairs.len(), 1);
}

#[tokio::test]
async fn rate_limit_before_any_batch_still_reports_the_run() {
    let mut gateway = MockGateway::new(
        vec![record("m1", &[("numero", "+50259515736")])],
        vec![record(
            "c1",
            &[
                ("numero_telefono_id_unico", "+50259515736"),
                ("phone", "+50259515736"),
            ],
        )],
    );
    gateway.rate_limit_associations = true;
    let config = SyncConfig::default();

    let summary = Reconciler::new(&gateway, &config).run().await.unwrap();
    assert_eq!(summary.messages_indexed, 1);
    assert_eq!(summary.pairs_built, 1);
    assert_eq!(summary.associations_created, 0);
    assert_eq!(summary.associations_remaining, 1);
}

#[tokio::test]
async fn contacts_without_messages_are_counted() {
    let gateway = MockGateway::new(
        vec![record("m1", &[("numero", "+50259515736")])],
        vec![
            record(
                "c1",
                &[
                    ("numero_telefono_id_unico", "+50259515736"),
                    ("phone", "+50259515736"),
                ],
            ),
            // Owns a phone no message references
            record(
                "c2",
                &[
                    ("numero_telefono_id_unico", "+50242183669"),
                    ("phone", "+50242183669"),
                ],
            ),
        ],
    );
    let config = SyncConfig::default();

    let summary = Reconciler::new(&gateway, &config).run().await.unwrap();
    assert_eq!(summary.skipped_no_message, 1);
    assert_eq!(summary.pairs_built, 1);
    assert_eq!(summary.associations_created, 1);
}

#[tokio::test]
async fn lossy_phone_values_are_counted_but_still_processed() {
    let gateway = MockGateway::new(
        vec![
            record("m1", &[("numero", "1234567")]),
            record("m2", &[("numero", "59515736")]),
        ],
        vec![],
    );
    let config = SyncConfig::default();

    let summary = Reconciler::new(&gateway, &config).run().await.unwrap();
    assert_eq!(summary.distinct_phones, 2);
    assert_eq!(summary.unverified_phones, 1);
    // The lossy value still gets a contact and an association
    assert_eq!(summary.contacts_created, 2);
    assert_eq!(summary.associations_created, 2);
}

#[tokio::test]
async fn missing_association_label_aborts_the_run() {
    let mut gateway = MockGateway::new(
        vec![record("m1", &[("numero", "+50259515736")])],
        vec![record(
            "c1",
            &[
                ("numero_telefono_id_unico", "+50259515736"),
                ("phone", "+50259515736"),
            ],
        )],
    );
    gateway.missing_label = true;
    let config = SyncConfig::default();

    let result = Reconciler::new(&gateway, &config).run().await;
    assert!(matches!(
        result,
        Err(Error::AssociationLabelMissing { .. })
    ));
}

#[tokio::test]
async fn no_messages_is_a_clean_noop() {
    let gateway = MockGateway::new(vec![], vec![]);
    let config = SyncConfig::default();

    let summary = Reconciler::new(&gateway, &config).run().await.unwrap();
    assert_eq!(summary.messages_indexed, 0);
    assert_eq!(summary.pairs_built, 0);
    assert!(gateway.state.lock().unwrap().upserted.is_empty());
}
