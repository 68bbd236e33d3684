//! In-memory store.

use crate::error::AcceptanceResult;
use crate::independence::IndependenceDeclaration;
use crate::letter::EngagementLetter;
use crate::risk::ClientRiskAssessment;
use crate::store::{AcceptanceStore, Versioned, declaration_prefix, next_revision};
use crate::types::{DeclarationId, EngagementId, Revision, TeamMember};
use crate::workflow::AcceptanceWorkflow;
use std::collections::{BTreeMap, BTreeSet};

/// BTreeMap-backed store with the same revision semantics as `RedbStore`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    workflows: BTreeMap<EngagementId, AcceptanceWorkflow>,
    teams: BTreeMap<EngagementId, Vec<TeamMember>>,
    declarations: BTreeMap<DeclarationId, IndependenceDeclaration>,
    risk_assessments: BTreeMap<EngagementId, ClientRiskAssessment>,
    letters: BTreeMap<EngagementId, EngagementLetter>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn put<K: Ord, T: Versioned + Clone>(
    map: &mut BTreeMap<K, T>,
    key: K,
    record: &T,
) -> AcceptanceResult<Revision> {
    let stored = map.get(&key).map(Versioned::revision);
    let next = next_revision(T::KIND, &record.key(), record.revision(), stored)?;
    let mut record = record.clone();
    record.set_revision(next);
    map.insert(key, record);
    Ok(next)
}

impl AcceptanceStore for MemoryStore {
    fn fetch_workflow(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<Option<AcceptanceWorkflow>> {
        Ok(self.workflows.get(engagement).cloned())
    }

    fn save_workflow(&mut self, workflow: &AcceptanceWorkflow) -> AcceptanceResult<Revision> {
        put(
            &mut self.workflows,
            workflow.engagement_id.clone(),
            workflow,
        )
    }

    fn fetch_team(&self, engagement: &EngagementId) -> AcceptanceResult<Vec<TeamMember>> {
        Ok(self.teams.get(engagement).cloned().unwrap_or_default())
    }

    fn save_team(
        &mut self,
        engagement: &EngagementId,
        members: &[TeamMember],
    ) -> AcceptanceResult<()> {
        self.teams.insert(engagement.clone(), members.to_vec());
        Ok(())
    }

    fn fetch_independence_declarations(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<Vec<IndependenceDeclaration>> {
        let prefix = declaration_prefix(engagement);
        Ok(self
            .declarations
            .range(DeclarationId::new(prefix.clone())..)
            .take_while(|(id, _)| id.as_str().starts_with(&prefix))
            .filter(|(_, decl)| &decl.engagement_id == engagement)
            .map(|(_, decl)| decl.clone())
            .collect())
    }

    fn fetch_independence_declaration(
        &self,
        id: &DeclarationId,
    ) -> AcceptanceResult<Option<IndependenceDeclaration>> {
        Ok(self.declarations.get(id).cloned())
    }

    fn save_independence_declaration(
        &mut self,
        declaration: &IndependenceDeclaration,
    ) -> AcceptanceResult<Revision> {
        put(&mut self.declarations, declaration.id.clone(), declaration)
    }

    fn fetch_risk_assessment(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<Option<ClientRiskAssessment>> {
        Ok(self.risk_assessments.get(engagement).cloned())
    }

    fn save_risk_assessment(
        &mut self,
        assessment: &ClientRiskAssessment,
    ) -> AcceptanceResult<Revision> {
        put(
            &mut self.risk_assessments,
            assessment.engagement_id.clone(),
            assessment,
        )
    }

    fn fetch_engagement_letter(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<Option<EngagementLetter>> {
        Ok(self.letters.get(engagement).cloned())
    }

    fn save_engagement_letter(&mut self, letter: &EngagementLetter) -> AcceptanceResult<Revision> {
        put(&mut self.letters, letter.engagement_id.clone(), letter)
    }

    fn list_engagements(&self) -> AcceptanceResult<Vec<EngagementId>> {
        let mut ids: BTreeSet<EngagementId> = BTreeSet::new();
        ids.extend(self.workflows.keys().cloned());
        ids.extend(self.teams.keys().cloned());
        ids.extend(self.risk_assessments.keys().cloned());
        ids.extend(self.letters.keys().cloned());
        ids.extend(self.declarations.values().map(|d| d.engagement_id.clone()));
        Ok(ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AcceptanceError;
    use crate::independence::DeclarationForm;
    use crate::types::MemberId;

    #[test]
    fn save_bumps_revision() {
        let mut store = MemoryStore::new();
        let mut workflow = AcceptanceWorkflow::new(EngagementId::new("e"));

        assert_eq!(store.save_workflow(&workflow), Ok(1));
        workflow.revision = 1;
        assert_eq!(store.save_workflow(&workflow), Ok(2));
    }

    #[test]
    fn stale_write_is_rejected() {
        let mut store = MemoryStore::new();
        let workflow = AcceptanceWorkflow::new(EngagementId::new("e"));
        store.save_workflow(&workflow).ok();

        // second writer still holds revision 0
        assert!(matches!(
            store.save_workflow(&workflow),
            Err(AcceptanceError::Conflict { presented: 0, stored: 1, .. })
        ));
    }

    #[test]
    fn declarations_are_scoped_by_engagement() {
        let mut store = MemoryStore::new();
        for (engagement, member) in [("e1", "a"), ("e1", "b"), ("e10", "a"), ("e2", "a")] {
            let decl = IndependenceDeclaration::new(
                EngagementId::new(engagement),
                MemberId::new(member),
                DeclarationForm::default(),
            );
            store.save_independence_declaration(&decl).ok();
        }

        let found = store
            .fetch_independence_declarations(&EngagementId::new("e1"))
            .unwrap_or_default();
        let members: Vec<_> = found.iter().map(|d| d.member_id.as_str()).collect();
        assert_eq!(members, vec!["a", "b"]);
    }

    #[test]
    fn declarations_of_a_longer_engagement_id_are_not_shared() {
        let mut store = MemoryStore::new();
        for (engagement, member) in [("acme", "sam"), ("acme:2025", "pat")] {
            let decl = IndependenceDeclaration::new(
                EngagementId::new(engagement),
                MemberId::new(member),
                DeclarationForm::default(),
            );
            store.save_independence_declaration(&decl).ok();
        }

        let found = store
            .fetch_independence_declarations(&EngagementId::new("acme"))
            .unwrap_or_default();
        let members: Vec<_> = found.iter().map(|d| d.member_id.as_str()).collect();
        assert_eq!(members, vec!["sam"]);
    }

    #[test]
    fn list_engagements_merges_record_kinds() {
        let mut store = MemoryStore::new();
        store
            .save_team(&EngagementId::new("b"), &[])
            .ok();
        store
            .save_risk_assessment(&ClientRiskAssessment::new(EngagementId::new("a")))
            .ok();

        let ids = store.list_engagements().unwrap_or_default();
        assert_eq!(ids, vec![EngagementId::new("a"), EngagementId::new("b")]);
    }
}
