//! redb-backed store.
//!
//! One table per record kind, string keys, enveloped postcard values.
//! Declarations are keyed `"{engagement}:{member}"` so an engagement's
//! declarations form one contiguous key range.

use crate::error::AcceptanceResult;
use crate::formats::{decode_record, encode_record};
use crate::independence::IndependenceDeclaration;
use crate::letter::EngagementLetter;
use crate::risk::ClientRiskAssessment;
use crate::store::{AcceptanceStore, Versioned, declaration_prefix, next_revision};
use crate::types::{DeclarationId, EngagementId, Revision, TeamMember};
use crate::workflow::AcceptanceWorkflow;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

// =============================================================================
// TABLES
// =============================================================================

type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

const WORKFLOWS: RecordTable = TableDefinition::new("workflows");
const TEAMS: RecordTable = TableDefinition::new("teams");
const DECLARATIONS: RecordTable = TableDefinition::new("declarations");
const RISK_ASSESSMENTS: RecordTable = TableDefinition::new("risk_assessments");
const LETTERS: RecordTable = TableDefinition::new("letters");

const ALL_TABLES: [RecordTable; 5] = [WORKFLOWS, TEAMS, DECLARATIONS, RISK_ASSESSMENTS, LETTERS];

// =============================================================================
// REDB STORE
// =============================================================================

/// Disk-backed store.
pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").field("path", &self.path).finish()
    }
}

impl RedbStore {
    /// Open or create the database at `path`, creating missing tables.
    pub fn open(path: impl AsRef<Path>) -> AcceptanceResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path)?;

        let txn = db.begin_write()?;
        for table in ALL_TABLES {
            txn.open_table(table)?;
        }
        txn.commit()?;

        Ok(Self { db, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn get<T: DeserializeOwned>(
        &self,
        table: RecordTable,
        key: &str,
    ) -> AcceptanceResult<Option<T>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table)?;
        let record = match table.get(key)? {
            Some(value) => Some(decode_record(value.value())?),
            None => None,
        };
        Ok(record)
    }

    fn put_raw<T: Serialize>(
        &self,
        table: RecordTable,
        key: &str,
        record: &T,
    ) -> AcceptanceResult<()> {
        let bytes = encode_record(record)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(table)?;
            table.insert(key, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Revision check and write in one write transaction.
    fn put_versioned<T>(
        &self,
        table: RecordTable,
        record: &T,
    ) -> AcceptanceResult<Revision>
    where
        T: Versioned + Serialize + DeserializeOwned + Clone,
    {
        let key = record.key();
        let txn = self.db.begin_write()?;
        let next = {
            let mut table = txn.open_table(table)?;
            let stored = match table.get(key.as_str())? {
                Some(value) => Some(decode_record::<T>(value.value())?.revision()),
                None => None,
            };
            let next = next_revision(T::KIND, &key, record.revision(), stored)?;

            let mut record = record.clone();
            record.set_revision(next);
            let bytes = encode_record(&record)?;
            table.insert(key.as_str(), bytes.as_slice())?;
            next
        };
        txn.commit()?;
        Ok(next)
    }

    fn keys(&self, table: RecordTable) -> AcceptanceResult<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table)?;
        let mut keys = Vec::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

impl AcceptanceStore for RedbStore {
    fn fetch_workflow(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<Option<AcceptanceWorkflow>> {
        self.get(WORKFLOWS, engagement.as_str())
    }

    fn save_workflow(&mut self, workflow: &AcceptanceWorkflow) -> AcceptanceResult<Revision> {
        self.put_versioned(WORKFLOWS, workflow)
    }

    fn fetch_team(&self, engagement: &EngagementId) -> AcceptanceResult<Vec<TeamMember>> {
        Ok(self
            .get::<Vec<TeamMember>>(TEAMS, engagement.as_str())?
            .unwrap_or_default())
    }

    fn save_team(
        &mut self,
        engagement: &EngagementId,
        members: &[TeamMember],
    ) -> AcceptanceResult<()> {
        self.put_raw(TEAMS, engagement.as_str(), &members)
    }

    fn fetch_independence_declarations(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<Vec<IndependenceDeclaration>> {
        let prefix = declaration_prefix(engagement);
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DECLARATIONS)?;

        let mut declarations = Vec::new();
        for entry in table.range(prefix.as_str()..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(prefix.as_str()) {
                break;
            }
            let declaration: IndependenceDeclaration = decode_record(value.value())?;
            if &declaration.engagement_id == engagement {
                declarations.push(declaration);
            }
        }
        Ok(declarations)
    }

    fn fetch_independence_declaration(
        &self,
        id: &DeclarationId,
    ) -> AcceptanceResult<Option<IndependenceDeclaration>> {
        self.get(DECLARATIONS, id.as_str())
    }

    fn save_independence_declaration(
        &mut self,
        declaration: &IndependenceDeclaration,
    ) -> AcceptanceResult<Revision> {
        self.put_versioned(DECLARATIONS, declaration)
    }

    fn fetch_risk_assessment(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<Option<ClientRiskAssessment>> {
        self.get(RISK_ASSESSMENTS, engagement.as_str())
    }

    fn save_risk_assessment(
        &mut self,
        assessment: &ClientRiskAssessment,
    ) -> AcceptanceResult<Revision> {
        self.put_versioned(RISK_ASSESSMENTS, assessment)
    }

    fn fetch_engagement_letter(
        &self,
        engagement: &EngagementId,
    ) -> AcceptanceResult<Option<EngagementLetter>> {
        self.get(LETTERS, engagement.as_str())
    }

    fn save_engagement_letter(&mut self, letter: &EngagementLetter) -> AcceptanceResult<Revision> {
        self.put_versioned(LETTERS, letter)
    }

    fn list_engagements(&self) -> AcceptanceResult<Vec<EngagementId>> {
        let mut ids = BTreeSet::new();
        for table in [WORKFLOWS, TEAMS, RISK_ASSESSMENTS, LETTERS] {
            ids.extend(self.keys(table)?);
        }
        let mut ids: BTreeSet<EngagementId> = ids.into_iter().map(EngagementId).collect();

        // the key alone is ambiguous once an engagement id holds the separator
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DECLARATIONS)?;
        for entry in table.iter()? {
            let (_, value) = entry?;
            let declaration: IndependenceDeclaration = decode_record(value.value())?;
            ids.insert(declaration.engagement_id);
        }
        Ok(ids.into_iter().collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AcceptanceError;
    use crate::independence::DeclarationForm;
    use crate::types::{MemberId, TeamRole};

    fn open_temp() -> (tempfile::TempDir, RedbStore) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let store = RedbStore::open(dir.path().join("acceptance.redb"))
            .expect("failed to open store");
        (dir, store)
    }

    #[test]
    fn missing_records_read_as_none() {
        let (_dir, store) = open_temp();
        let engagement = EngagementId::new("e");
        assert_eq!(store.fetch_workflow(&engagement), Ok(None));
        assert_eq!(store.fetch_team(&engagement), Ok(Vec::new()));
        assert_eq!(store.fetch_risk_assessment(&engagement), Ok(None));
    }

    #[test]
    fn versioned_save_and_conflict() {
        let (_dir, mut store) = open_temp();
        let mut assessment = ClientRiskAssessment::new(EngagementId::new("e"));

        assert_eq!(store.save_risk_assessment(&assessment), Ok(1));
        assert!(matches!(
            store.save_risk_assessment(&assessment),
            Err(AcceptanceError::Conflict { .. })
        ));

        assessment.revision = 1;
        assert_eq!(store.save_risk_assessment(&assessment), Ok(2));

        let stored = store
            .fetch_risk_assessment(&assessment.engagement_id)
            .ok()
            .flatten();
        assert_eq!(stored.map(|a| a.revision), Some(2));
    }

    #[test]
    fn team_roundtrip() {
        let (_dir, mut store) = open_temp();
        let engagement = EngagementId::new("e");
        let team = vec![
            TeamMember::new("p", "Pat", TeamRole::Partner),
            TeamMember::new("s", "Sky", TeamRole::Staff),
        ];
        assert!(store.save_team(&engagement, &team).is_ok());
        assert_eq!(store.fetch_team(&engagement), Ok(team));
    }

    #[test]
    fn declarations_range_by_engagement() {
        let (_dir, mut store) = open_temp();
        for (engagement, member) in [("e1", "a"), ("e1", "b"), ("e10", "a")] {
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
        assert_eq!(found.len(), 2);

        let ids = store.list_engagements().unwrap_or_default();
        assert_eq!(ids, vec![EngagementId::new("e1"), EngagementId::new("e10")]);
    }

    #[test]
    fn separator_in_engagement_id_does_not_leak_declarations() {
        let (_dir, mut store) = open_temp();
        let mut foreign = IndependenceDeclaration::new(
            EngagementId::new("acme:2025"),
            MemberId::new("pat"),
            DeclarationForm::default(),
        );
        foreign.is_certified = true;
        store.save_independence_declaration(&foreign).ok();
        store
            .save_team(
                &EngagementId::new("acme"),
                &[TeamMember::new("pat", "Pat", TeamRole::Partner)],
            )
            .ok();

        let found = store
            .fetch_independence_declarations(&EngagementId::new("acme"))
            .unwrap_or_default();
        assert!(found.is_empty());

        let ids = store.list_engagements().unwrap_or_default();
        assert_eq!(
            ids,
            vec![EngagementId::new("acme"), EngagementId::new("acme:2025")]
        );
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("acceptance.redb");
        {
            let mut store = RedbStore::open(&path).expect("failed to open store");
            let workflow = AcceptanceWorkflow::new(EngagementId::new("e"));
            store.save_workflow(&workflow).ok();
        }
        let store = RedbStore::open(&path).expect("failed to open store");
        let workflow = store.fetch_workflow(&EngagementId::new("e")).ok().flatten();
        assert_eq!(workflow.map(|w| w.revision), Some(1));
    }
}
