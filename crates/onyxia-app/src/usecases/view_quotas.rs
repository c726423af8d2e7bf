//! Namespace quotas of the current project.
//!
//! Polled with an adaptive cadence: while a service deletion is in progress
//! usage is about to drop, so the short `ongoing_deletion_interval_ms`
//! applies; otherwise the steady `interval_ms`.

use onyxia_core::reactive::Memo;
use onyxia_core::OnyxiaError;
use serde::Serialize;
use std::sync::Arc;

use crate::api::Quotas;
use crate::app::ThunkContext;
use crate::events::EventFilter;
use crate::polling::{Cancellation, InFlight, PollingHandle, PollingSignals};
use crate::quantity::parse_quantity;
use crate::store::{Slice, SliceAction, SliceState};
use crate::usecases::project_management::{ProjectManagement, ProjectManagementSlice, PROJECT_CHANGED};
use crate::usecases::service_management::{
    ServiceManagement, ServiceManagementSlice, DELETION_STARTED, SERVICE_DELETED,
};

/// Slice marker.
#[derive(Debug)]
pub struct ViewQuotasSlice;

/// Live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewQuotasState {
    /// Project the quotas belong to
    pub project_id: String,
    /// Quotas as last polled
    pub quotas: Quotas,
}

/// Actions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ViewQuotasAction {
    /// A poll returned
    #[serde(rename_all = "camelCase")]
    UpdateCompleted {
        /// Project polled
        project_id: String,
        /// Quotas returned
        quotas: Quotas,
    },
}

impl SliceAction for ViewQuotasAction {
    fn name(&self) -> &'static str {
        match self {
            Self::UpdateCompleted { .. } => "updateCompleted",
        }
    }
}

impl Slice for ViewQuotasSlice {
    const NAME: &'static str = "viewQuotas";
    type State = ViewQuotasState;
    type Action = ViewQuotasAction;

    fn reduce(state: &mut SliceState<ViewQuotasState>, action: &ViewQuotasAction) -> Result<(), OnyxiaError> {
        match action {
            ViewQuotasAction::UpdateCompleted { project_id, quotas } => {
                *state = SliceState::Ready(ViewQuotasState {
                    project_id: project_id.clone(),
                    quotas: quotas.clone(),
                });
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// View model
// ─────────────────────────────────────────────────────────────────────────────

/// How close a quota is to its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaSeverity {
    /// Below 50%
    Success,
    /// 50% up to 80%
    Warning,
    /// 80% and above
    Error,
}

impl QuotaSeverity {
    /// Classify a usage ratio.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 0.5 {
            Self::Success
        } else if ratio < 0.8 {
            Self::Warning
        } else {
            Self::Error
        }
    }
}

/// One quota line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaEntryView {
    /// Resource name (`requests.memory`)
    pub name: String,
    /// Usage as reported
    pub used: String,
    /// Limit as reported
    pub total: String,
    /// `used / total`
    pub usage_ratio: f64,
    /// Rounded percentage
    pub usage_percentage: u32,
    /// Classification of the ratio
    pub severity: QuotaSeverity,
}

/// Quotas, most consumed first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotasView {
    /// Entries with a defined, positive limit
    pub entries: Vec<QuotaEntryView>,
    /// Whether any entry is at error severity
    pub has_critical: bool,
}

fn derive_quotas(quotas: &Quotas) -> QuotasView {
    let mut entries: Vec<QuotaEntryView> = quotas
        .spec
        .iter()
        .filter_map(|(name, total)| {
            let total_value = parse_quantity(total).ok().filter(|t| *t > 0.0)?;
            let used = quotas.usage.get(name).cloned().unwrap_or_else(|| "0".to_string());
            let used_value = parse_quantity(&used).ok()?;
            let usage_ratio = used_value / total_value;
            Some(QuotaEntryView {
                name: name.clone(),
                used,
                total: total.clone(),
                usage_ratio,
                usage_percentage: (usage_ratio * 100.0).round() as u32,
                severity: QuotaSeverity::from_ratio(usage_ratio),
            })
        })
        .collect();
    entries.sort_by(|a, b| {
        b.usage_ratio
            .total_cmp(&a.usage_ratio)
            .then_with(|| a.name.cmp(&b.name))
    });
    let has_critical = entries.iter().any(|e| e.severity == QuotaSeverity::Error);
    QuotasView { entries, has_critical }
}

// ─────────────────────────────────────────────────────────────────────────────
// Usecase
// ─────────────────────────────────────────────────────────────────────────────

/// Quota usecase.
#[derive(Clone)]
pub struct ViewQuotas {
    ctx: ThunkContext,
    projects: ProjectManagement,
    services: ServiceManagement,
    in_flight: Arc<InFlight>,
    quotas_view: Arc<Memo<Quotas, QuotasView>>,
}

impl ViewQuotas {
    pub(crate) fn new(ctx: ThunkContext, projects: ProjectManagement, services: ServiceManagement) -> Self {
        Self {
            ctx,
            projects,
            services,
            in_flight: Arc::new(InFlight::default()),
            quotas_view: Arc::new(Memo::new(derive_quotas)),
        }
    }

    // ─── Thunks ───────────────────────────────────────────────────────────

    /// Start polling quotas.
    ///
    /// Returns a no-op handle when quotas are disabled on this deployment.
    /// Project switches and deletion lifecycle events trigger an immediate
    /// refresh.
    pub fn set_active(&self) -> PollingHandle {
        let policy = self.ctx.config.polling.quotas.clone();
        if !policy.enabled {
            tracing::debug!("Quotas disabled; not polling");
            return PollingHandle::noop();
        }

        let wake = EventFilter::action(ProjectManagementSlice::NAME, PROJECT_CHANGED)
            .or_action(ServiceManagementSlice::NAME, DELETION_STARTED)
            .or_action(ServiceManagementSlice::NAME, SERVICE_DELETED);
        let signals = PollingSignals::none().wake_on(self.ctx.store.bus().subscribe(wake));

        let this = self.clone();
        let services = self.services.clone();
        self.ctx.polling.start(
            "quotas",
            signals,
            move |cancel| {
                let this = this.clone();
                async move { this.update(&cancel).await }
            },
            move || policy.delay(services.has_ongoing_deletion()),
        )
    }

    async fn update(&self, cancel: &Cancellation) -> Result<(), OnyxiaError> {
        let Some(_guard) = self.in_flight.try_begin() else {
            return Ok(());
        };
        let project_id = self.projects.current_project_id()?;
        let quotas = self.ctx.api.get_quotas(&project_id).await?;
        if cancel.is_cancelled() {
            return Ok(());
        }
        if self.projects.current_project_id()? != project_id {
            tracing::debug!(project_id = %project_id, "Discarding quotas of a previous project");
            return Ok(());
        }
        self.ctx
            .store
            .dispatch::<ViewQuotasSlice>(ViewQuotasAction::UpdateCompleted { project_id, quotas })
    }

    // ─── Selectors ────────────────────────────────────────────────────────

    /// Quota view model. Fails until the first poll completed.
    pub fn quotas(&self) -> Result<Arc<QuotasView>, OnyxiaError> {
        let quotas = self
            .ctx
            .store
            .read::<ViewQuotasSlice, _>(|state| state.quotas.clone())?;
        Ok(self.quotas_view.get(quotas))
    }

    /// Whether quotas exist on this deployment.
    pub fn is_available(&self) -> bool {
        self.ctx.config.polling.quotas.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn quotas(entries: &[(&str, &str, Option<&str>)]) -> Quotas {
        let mut spec = BTreeMap::new();
        let mut usage = BTreeMap::new();
        for (name, total, used) in entries {
            spec.insert(name.to_string(), total.to_string());
            if let Some(used) = used {
                usage.insert(name.to_string(), used.to_string());
            }
        }
        Quotas { spec, usage }
    }

    #[test]
    fn severity_thresholds() {
        assert_eq!(QuotaSeverity::from_ratio(0.49), QuotaSeverity::Success);
        assert_eq!(QuotaSeverity::from_ratio(0.5), QuotaSeverity::Warning);
        assert_eq!(QuotaSeverity::from_ratio(0.79), QuotaSeverity::Warning);
        assert_eq!(QuotaSeverity::from_ratio(0.8), QuotaSeverity::Error);
    }

    #[test]
    fn view_parses_quantities_and_sorts_by_ratio() {
        let view = derive_quotas(&quotas(&[
            ("requests.cpu", "4", Some("500m")),
            ("requests.memory", "8Gi", Some("7Gi")),
            ("count/pods", "10", None),
        ]));
        let names: Vec<&str> = view.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["requests.memory", "requests.cpu", "count/pods"]);
        assert_eq!(view.entries[0].usage_percentage, 88);
        assert_eq!(view.entries[1].usage_percentage, 13);
        assert_eq!(view.entries[2].used, "0");
        assert!(view.has_critical);
    }

    #[test]
    fn unusable_entries_are_skipped() {
        let view = derive_quotas(&quotas(&[
            ("zero", "0", Some("1")),
            ("garbage", "lots", Some("1")),
        ]));
        assert!(view.entries.is_empty());
        assert!(!view.has_critical);
    }
}
