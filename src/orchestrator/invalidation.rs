use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::eval::EvaluationContext;
use crate::form::{FieldDefinition, ResponseStore};
use crate::InternalResult;

use super::{FieldOrchestrator, Slot, SlotKey};

impl FieldOrchestrator {
    /// Re-issues every dispatched parameter evaluation and drops every
    /// recorded validation whose dependencies intersect `changed`.
    ///
    /// Only slots that were evaluated before are considered. Slots with
    /// unknown dependencies are always invalidated.
    #[instrument(level = "debug", skip_all, fields(changed = changed.len()))]
    pub fn invalidate_on_context_change(
        &self,
        changed: &HashSet<String>,
        fields: &[FieldDefinition],
        context: &EvaluationContext,
    ) -> InternalResult<Vec<SlotKey>> {
        let mut invalidated = Vec::new();
        for field in fields {
            let bound = context.with_this_response(&field.code);
            for (name, expression) in field.dynamic_parameters() {
                let key = SlotKey::parameter(&field.code, name);
                let affected = match self.dependencies.get(&key) {
                    Some(dependencies) => dependencies.affected_by(changed, &field.code),
                    None => false,
                };
                if affected {
                    self.dispatch_parameter(&field.code, name, expression, &bound, true)?;
                    invalidated.push(key);
                }
            }

            if !self.validations.contains_key(&field.code) {
                continue;
            }
            let key = SlotKey::validation(&field.code);
            let affected = match self.dependencies.get(&key) {
                Some(dependencies) => dependencies.affected_by(changed, &field.code),
                None => true,
            };
            if affected {
                self.validations.remove(&field.code);
                invalidated.push(key);
            }
        }
        debug!("invalidated {} slots", invalidated.len());
        Ok(invalidated)
    }

    /// Keeps evaluated state in step with `store`: every saved response
    /// invalidates the slots depending on it and re-runs the affected
    /// validations. Runs until the store is dropped.
    pub fn watch_store(
        self: &Arc<Self>,
        store: Arc<ResponseStore>,
        fields: Arc<Vec<FieldDefinition>>,
        current_user: Value,
        application_data: Value,
        strict: bool,
    ) -> JoinHandle<()> {
        let orchestrator = self.clone();
        let mut changes = store.subscribe();
        let store = Arc::downgrade(&store);
        tokio::spawn(async move {
            loop {
                let mut changed = HashSet::new();
                match changes.recv().await {
                    Ok(change) => {
                        changed.insert(change.code);
                    }
                    Err(RecvError::Lagged(count)) => {
                        warn!("missed {} response changes, invalidating all fields", count);
                        changed.extend(fields.iter().map(|f| f.code.clone()));
                    }
                    Err(RecvError::Closed) => break,
                }
                // 同じtickの変更はまとめて処理
                loop {
                    match changes.try_recv() {
                        Ok(change) => {
                            changed.insert(change.code);
                        }
                        Err(TryRecvError::Lagged(_)) => {
                            changed.extend(fields.iter().map(|f| f.code.clone()));
                        }
                        Err(_) => break,
                    }
                }

                let Some(store) = store.upgrade() else {
                    break;
                };
                let context = store
                    .snapshot(current_user.clone(), application_data.clone())
                    .await;
                drop(store);

                if let Err(e) = orchestrator.refresh(&changed, &fields, &context, strict).await {
                    warn!("failed to refresh fields after change: {}", e);
                }
            }
            info!("response store closed, stopping watcher");
        })
    }

    async fn refresh(
        &self,
        changed: &HashSet<String>,
        fields: &[FieldDefinition],
        context: &EvaluationContext,
        strict: bool,
    ) -> InternalResult<()> {
        let invalidated = self.invalidate_on_context_change(changed, fields, context)?;
        for key in invalidated.iter().filter(|key| key.slot == Slot::Validation) {
            let Some(field) = fields.iter().find(|f| f.code == key.field) else {
                continue;
            };
            self.revalidate(field, strict, context).await?;
        }
        Ok(())
    }
}
