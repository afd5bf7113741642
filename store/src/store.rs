use std::cmp::Reverse;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use chrono::Utc;
use oasis_protocol::RiskRequest;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::clamp_limit;
use crate::document;
use crate::document::StoreDocument;
use crate::error::Result;
use crate::error::StoreError;
use crate::new_id;
use crate::records::Assessment;
use crate::records::AssessmentSummary;
use crate::records::AssessmentVersion;
use crate::records::Feedback;
use crate::records::FeedbackReceipt;
use crate::records::NewFeedback;
use crate::records::NewVersion;
use crate::records::Project;
use crate::validation;

static SHARED: LazyLock<Mutex<HashMap<PathBuf, AssessmentStore>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Handle to a JSON store file.
///
/// Every handle for the same file is a clone of one process-wide handle, so
/// all of them serialise on the same lock.
#[derive(Debug, Clone)]
pub struct AssessmentStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    lock: Mutex<()>,
    template_generation: AtomicU64,
}

impl AssessmentStore {
    /// The process-wide handle for `path`. The file is not touched until the
    /// first operation.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut registry = SHARED.lock().unwrap_or_else(PoisonError::into_inner);
        registry
            .entry(registry_key(path))
            .or_insert_with(|| Self {
                inner: Arc::new(Inner {
                    path: path.to_path_buf(),
                    lock: Mutex::new(()),
                    template_generation: AtomicU64::new(0),
                }),
            })
            .clone()
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.inner
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Counter bumped after every committed prompt template write through any
    /// handle for this file.
    pub fn template_generation(&self) -> u64 {
        self.inner.template_generation.load(Ordering::Acquire)
    }

    pub(crate) fn bump_template_generation(&self) {
        self.inner.template_generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Run `op` against a fresh snapshot under the lock and persist the
    /// result. Nothing is written when `op` fails.
    pub fn transact<R>(
        &self,
        op: impl FnOnce(&mut StoreDocument) -> Result<R>,
    ) -> Result<R> {
        let _guard = self.guard();
        let mut doc = document::load(self.path())?;
        let out = op(&mut doc)?;
        document::persist(self.path(), &doc)?;
        debug!(path = %self.path().display(), "store document persisted");
        Ok(out)
    }

    /// Run `op` against a snapshot under the lock without writing.
    pub fn read<R>(&self, op: impl FnOnce(&StoreDocument) -> Result<R>) -> Result<R> {
        let _guard = self.guard();
        let doc = document::load(self.path())?;
        op(&doc)
    }

    // ---------------------------------------------------------------------
    // Projects
    // ---------------------------------------------------------------------

    pub fn create_project(&self, name: &str, description: Option<&str>) -> Result<Project> {
        let name = validation::required_text("name", name, validation::MAX_NAME_CHARS)?;
        let description = validation::optional_text(
            "description",
            description,
            validation::MAX_DESCRIPTION_CHARS,
        )?;

        self.transact(|doc| {
            let now = Utc::now();
            let project = Project {
                project_id: new_id(),
                name,
                description,
                created_at: now,
                updated_at: now,
            };
            doc.projects
                .insert(project.project_id.clone(), project.clone());
            info!(project_id = %project.project_id, "project created");
            Ok(project)
        })
    }

    pub fn get_project(&self, project_id: &str) -> Result<Project> {
        self.read(|doc| {
            doc.projects
                .get(project_id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("project", project_id))
        })
    }

    /// Projects, most recently updated first.
    pub fn list_projects(&self, limit: Option<usize>) -> Result<Vec<Project>> {
        self.read(|doc| {
            let mut projects: Vec<Project> = doc.projects.values().cloned().collect();
            projects.sort_by_key(|r| Reverse(r.updated_at));
            projects.truncate(clamp_limit(limit));
            Ok(projects)
        })
    }

    // ---------------------------------------------------------------------
    // Assessments
    // ---------------------------------------------------------------------

    pub fn create_assessment(
        &self,
        project_id: &str,
        title: &str,
        template_id: Option<&str>,
        payload: RiskRequest,
    ) -> Result<Assessment> {
        let title = validation::required_text("title", title, validation::MAX_TITLE_CHARS)?;
        let template_id =
            validation::optional_text("template_id", template_id, validation::MAX_NAME_CHARS)?;

        self.transact(|doc| {
            let now = Utc::now();
            let project = doc
                .projects
                .get_mut(project_id)
                .ok_or_else(|| StoreError::not_found("project", project_id))?;
            project.updated_at = now;

            let assessment = Assessment {
                assessment_id: new_id(),
                project_id: project_id.to_string(),
                title,
                template_id,
                created_at: now,
                updated_at: now,
                payload,
                version_count: 0,
                version_ids: Vec::new(),
                latest_version_id: None,
            };
            doc.assessments
                .insert(assessment.assessment_id.clone(), assessment.clone());
            info!(
                project_id,
                assessment_id = %assessment.assessment_id,
                "assessment created"
            );
            Ok(assessment)
        })
    }

    pub fn get_assessment(&self, assessment_id: &str) -> Result<Assessment> {
        self.read(|doc| {
            doc.assessments
                .get(assessment_id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("assessment", assessment_id))
        })
    }

    /// Assessments of a project, most recently updated first.
    pub fn list_assessments(
        &self,
        project_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Assessment>> {
        self.read(|doc| project_assessments(doc, project_id, limit))
    }

    /// Like [`Self::list_assessments`] with the latest version's number and
    /// trace id resolved from the same snapshot.
    pub fn list_assessment_summaries(
        &self,
        project_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<AssessmentSummary>> {
        self.read(|doc| {
            Ok(project_assessments(doc, project_id, limit)?
                .into_iter()
                .map(|a| {
                    let latest = a
                        .latest_version_id
                        .as_deref()
                        .and_then(|id| doc.versions.get(id));
                    AssessmentSummary {
                        latest_version_number: latest.map(|v| v.version_number),
                        latest_trace_id: latest.map(|v| v.trace_id.clone()),
                        assessment_id: a.assessment_id,
                        project_id: a.project_id,
                        title: a.title,
                        version_count: a.version_count,
                        latest_version_id: a.latest_version_id,
                        updated_at: a.updated_at,
                    }
                })
                .collect())
        })
    }

    // ---------------------------------------------------------------------
    // Versions
    // ---------------------------------------------------------------------

    /// Append a version to an assessment.
    ///
    /// Allocates the next version number, moves `latest_version_id`, caches
    /// the request on the assessment and bumps `updated_at` on both the
    /// assessment and its project in one write.
    pub fn create_version(
        &self,
        assessment_id: &str,
        new: NewVersion,
    ) -> Result<AssessmentVersion> {
        self.transact(|doc| {
            let now = Utc::now();
            let assessment = doc
                .assessments
                .get_mut(assessment_id)
                .ok_or_else(|| StoreError::not_found("assessment", assessment_id))?;
            if new.response.trace_id != new.trace_id {
                return Err(StoreError::invalid(format!(
                    "response trace_id {} does not match version trace_id {}",
                    new.response.trace_id, new.trace_id
                )));
            }

            let previous_max = assessment
                .version_ids
                .iter()
                .filter_map(|id| doc.versions.get(id))
                .map(|v| v.version_number)
                .max()
                .unwrap_or(0)
                .max(assessment.version_count);

            let version = AssessmentVersion {
                version_id: new_id(),
                assessment_id: assessment_id.to_string(),
                version_number: previous_max + 1,
                created_at: now,
                trace_id: new.trace_id,
                mode: new.mode,
                resolved_mode: new.resolved_mode,
                llm_provider: new.llm_provider,
                llm_model: new.llm_model,
                prompt_variant: new.prompt_variant,
                system_prompt_sha256: new.system_prompt_sha256,
                user_prompt: new.user_prompt,
                rag_enabled: new.rag_enabled,
                request: new.request,
                response: new.response,
                feedback_ids: Vec::new(),
            };

            assessment.version_ids.push(version.version_id.clone());
            assessment.version_count = version.version_number;
            assessment.latest_version_id = Some(version.version_id.clone());
            assessment.payload = version.request.clone();
            assessment.updated_at = now;

            if let Some(project) = doc.projects.get_mut(&assessment.project_id) {
                project.updated_at = now;
            }

            doc.versions
                .insert(version.version_id.clone(), version.clone());
            info!(
                assessment_id,
                version_id = %version.version_id,
                version_number = version.version_number,
                trace_id = %version.trace_id,
                "version created"
            );
            Ok(version)
        })
    }

    pub fn get_version(&self, version_id: &str) -> Result<AssessmentVersion> {
        self.read(|doc| {
            doc.versions
                .get(version_id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("version", version_id))
        })
    }

    /// Versions of an assessment, highest version number first.
    pub fn list_versions(
        &self,
        assessment_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<AssessmentVersion>> {
        self.read(|doc| {
            if !doc.assessments.contains_key(assessment_id) {
                return Err(StoreError::not_found("assessment", assessment_id));
            }
            let mut versions: Vec<AssessmentVersion> = doc
                .versions
                .values()
                .filter(|v| v.assessment_id == assessment_id)
                .cloned()
                .collect();
            versions.sort_by_key(|r| Reverse(r.version_number));
            versions.truncate(clamp_limit(limit));
            Ok(versions)
        })
    }

    /// Versions across all assessments, newest first.
    pub fn list_recent_versions(&self, limit: Option<usize>) -> Result<Vec<AssessmentVersion>> {
        self.read(|doc| {
            let mut versions: Vec<AssessmentVersion> = doc.versions.values().cloned().collect();
            versions.sort_by_key(|r| Reverse(r.created_at));
            versions.truncate(clamp_limit(limit));
            Ok(versions)
        })
    }

    // ---------------------------------------------------------------------
    // Feedback
    // ---------------------------------------------------------------------

    /// Attach reviewer feedback to a version.
    ///
    /// The version decides the owning assessment. When `assessment_id` names
    /// a different one the record is stored against the real owner and the
    /// receipt reports the id the caller supplied.
    pub fn create_feedback(
        &self,
        assessment_id: &str,
        version_id: &str,
        new: NewFeedback,
    ) -> Result<FeedbackReceipt> {
        let rating = validation::rating(new.rating)?;
        let flags = validation::flags(new.flags)?;
        let comment = validation::optional_text(
            "comment",
            new.comment.as_deref(),
            validation::MAX_COMMENT_CHARS,
        )?;
        let reviewer = validation::optional_text(
            "reviewer",
            new.reviewer.as_deref(),
            validation::MAX_REVIEWER_CHARS,
        )?;
        if let Some(edits) = &new.recommended_edits {
            validation::bounded(
                "recommended_edits",
                &edits.to_string(),
                validation::MAX_COMMENT_CHARS,
            )?;
        }

        self.transact(|doc| {
            let version = doc
                .versions
                .get_mut(version_id)
                .ok_or_else(|| StoreError::not_found("version", version_id))?;

            let owner = version.assessment_id.clone();
            let reassigned_from = if owner == assessment_id {
                None
            } else {
                warn!(
                    version_id,
                    requested_assessment_id = assessment_id,
                    owning_assessment_id = %owner,
                    "feedback reassigned to the version's owning assessment"
                );
                Some(assessment_id.to_string())
            };

            let feedback = Feedback {
                feedback_id: new_id(),
                assessment_id: owner,
                version_id: version_id.to_string(),
                created_at: Utc::now(),
                rating,
                flags,
                comment,
                recommended_edits: new.recommended_edits,
                reviewer,
            };
            version.feedback_ids.push(feedback.feedback_id.clone());
            doc.feedback
                .insert(feedback.feedback_id.clone(), feedback.clone());
            info!(
                version_id,
                feedback_id = %feedback.feedback_id,
                "feedback recorded"
            );
            Ok(FeedbackReceipt {
                feedback,
                reassigned_from,
            })
        })
    }

    pub fn get_feedback(&self, feedback_id: &str) -> Result<Feedback> {
        self.read(|doc| {
            doc.feedback
                .get(feedback_id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("feedback", feedback_id))
        })
    }

    /// Feedback on one version, newest first.
    pub fn list_feedback(&self, version_id: &str, limit: Option<usize>) -> Result<Vec<Feedback>> {
        self.read(|doc| {
            if !doc.versions.contains_key(version_id) {
                return Err(StoreError::not_found("version", version_id));
            }
            let mut feedback: Vec<Feedback> = doc
                .feedback
                .values()
                .filter(|f| f.version_id == version_id)
                .cloned()
                .collect();
            feedback.sort_by_key(|r| Reverse(r.created_at));
            feedback.truncate(clamp_limit(limit));
            Ok(feedback)
        })
    }

    /// Feedback across all versions, newest first.
    pub fn list_recent_feedback(&self, limit: Option<usize>) -> Result<Vec<Feedback>> {
        self.read(|doc| {
            let mut feedback: Vec<Feedback> = doc.feedback.values().cloned().collect();
            feedback.sort_by_key(|r| Reverse(r.created_at));
            feedback.truncate(clamp_limit(limit));
            Ok(feedback)
        })
    }
}

fn project_assessments(
    doc: &StoreDocument,
    project_id: &str,
    limit: Option<usize>,
) -> Result<Vec<Assessment>> {
    if !doc.projects.contains_key(project_id) {
        return Err(StoreError::not_found("project", project_id));
    }
    let mut assessments: Vec<Assessment> = doc
        .assessments
        .values()
        .filter(|a| a.project_id == project_id)
        .cloned()
        .collect();
    assessments.sort_by_key(|r| Reverse(r.updated_at));
    assessments.truncate(clamp_limit(limit));
    Ok(assessments)
}

/// Registry key for `path`: the canonical parent joined with the file name,
/// so `./store.json` and `/abs/dir/store.json` share a handle.
fn registry_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|parent| parent.join(name))
            .unwrap_or(absolute),
        _ => absolute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oasis_protocol::ResolvedMode;
    use oasis_protocol::RiskResponse;
    use oasis_protocol::RunMode;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store() -> (TempDir, AssessmentStore) {
        let tmp = TempDir::new().unwrap();
        let store = AssessmentStore::open(tmp.path().join("store.json"));
        (tmp, store)
    }

    fn new_version(trace_id: &str) -> NewVersion {
        NewVersion {
            trace_id: trace_id.to_string(),
            mode: RunMode::Mock,
            resolved_mode: ResolvedMode::Mock,
            llm_provider: "openai".to_string(),
            llm_model: "mock".to_string(),
            prompt_variant: "default".to_string(),
            system_prompt_sha256: crate::sha256_hex("system"),
            user_prompt: "=== Business Type ===\nFintech".to_string(),
            rag_enabled: None,
            request: RiskRequest::new("Fintech", "Operational"),
            response: RiskResponse {
                trace_id: trace_id.to_string(),
                summary: "S".to_string(),
                risks: Vec::new(),
                assumptions_gaps: Vec::new(),
            },
        }
    }

    fn seeded(store: &AssessmentStore) -> Assessment {
        let project = store.create_project("Payments", None).unwrap();
        store
            .create_assessment(
                &project.project_id,
                "Vendor review",
                None,
                RiskRequest::new("Fintech", "Operational"),
            )
            .unwrap()
    }

    #[test]
    fn version_numbers_are_sequential() {
        let (_tmp, store) = store();
        let assessment = seeded(&store);

        let numbers: Vec<u32> = (0..3)
            .map(|i| {
                store
                    .create_version(&assessment.assessment_id, new_version(&format!("t{i}")))
                    .unwrap()
                    .version_number
            })
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        let reloaded = store.get_assessment(&assessment.assessment_id).unwrap();
        assert_eq!(reloaded.version_count, 3);
        let latest = store
            .get_version(reloaded.latest_version_id.as_deref().unwrap())
            .unwrap();
        assert_eq!(latest.version_number, 3);
        assert_eq!(reloaded.version_ids.len(), 3);

        let listed: Vec<u32> = store
            .list_versions(&assessment.assessment_id, None)
            .unwrap()
            .iter()
            .map(|v| v.version_number)
            .collect();
        assert_eq!(listed, vec![3, 2, 1]);
    }

    #[test]
    fn create_version_cascades_updated_at() {
        let (_tmp, store) = store();
        let assessment = seeded(&store);
        let version = store
            .create_version(&assessment.assessment_id, new_version("t1"))
            .unwrap();

        let reloaded = store.get_assessment(&assessment.assessment_id).unwrap();
        let project = store.get_project(&assessment.project_id).unwrap();
        assert_eq!(reloaded.updated_at, version.created_at);
        assert_eq!(project.updated_at, version.created_at);
    }

    #[test]
    fn create_version_rejects_unknown_assessment() {
        let (_tmp, store) = store();
        let err = store.create_version("missing", new_version("t1")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "assessment", .. }));
    }

    #[test]
    fn unknown_assessment_is_reported_before_trace_mismatch() {
        let (_tmp, store) = store();
        let mut new = new_version("t1");
        new.response.trace_id = "other".to_string();
        let err = store.create_version("missing", new).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "assessment", .. }));
    }

    #[test]
    fn create_version_rejects_trace_mismatch() {
        let (_tmp, store) = store();
        let assessment = seeded(&store);
        let mut new = new_version("t1");
        new.response.trace_id = "other".to_string();
        let err = store
            .create_version(&assessment.assessment_id, new)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        assert!(
            store
                .list_versions(&assessment.assessment_id, None)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn create_assessment_requires_project() {
        let (_tmp, store) = store();
        let err = store
            .create_assessment("nope", "T", None, RiskRequest::new("a", "b"))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "project", .. }));
    }

    #[test]
    fn feedback_on_missing_version_is_not_found() {
        let (_tmp, store) = store();
        let assessment = seeded(&store);
        let err = store
            .create_feedback(&assessment.assessment_id, "missing", NewFeedback::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "version", .. }));
    }

    #[test]
    fn feedback_is_reassigned_to_owning_assessment() {
        let (_tmp, store) = store();
        let assessment = seeded(&store);
        let version = store
            .create_version(&assessment.assessment_id, new_version("t1"))
            .unwrap();

        let receipt = store
            .create_feedback(
                "some-other-assessment",
                &version.version_id,
                NewFeedback {
                    rating: Some(4),
                    flags: vec!["needs-owner".to_string()],
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(receipt.feedback.assessment_id, assessment.assessment_id);
        assert_eq!(
            receipt.reassigned_from.as_deref(),
            Some("some-other-assessment")
        );
        let stored = store.get_feedback(&receipt.feedback.feedback_id).unwrap();
        assert_eq!(stored.assessment_id, assessment.assessment_id);
        let version = store.get_version(&version.version_id).unwrap();
        assert_eq!(version.feedback_ids, vec![stored.feedback_id]);
    }

    #[test]
    fn feedback_validation() {
        let (_tmp, store) = store();
        let assessment = seeded(&store);
        let version = store
            .create_version(&assessment.assessment_id, new_version("t1"))
            .unwrap();
        let err = store
            .create_feedback(
                &assessment.assessment_id,
                &version.version_id,
                NewFeedback {
                    rating: Some(9),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn returned_records_are_copies() {
        let (_tmp, store) = store();
        let mut project = store.create_project("Original", Some("desc")).unwrap();
        project.name = "Mutated".to_string();
        assert_eq!(store.get_project(&project.project_id).unwrap().name, "Original");
    }

    #[test]
    fn summaries_carry_latest_version() {
        let (_tmp, store) = store();
        let assessment = seeded(&store);
        store
            .create_version(&assessment.assessment_id, new_version("t1"))
            .unwrap();
        store
            .create_version(&assessment.assessment_id, new_version("t2"))
            .unwrap();

        let summaries = store
            .list_assessment_summaries(&assessment.project_id, None)
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].latest_version_number, Some(2));
        assert_eq!(summaries[0].latest_trace_id.as_deref(), Some("t2"));
    }

    #[test]
    fn summaries_cover_unversioned_assessments_and_unknown_projects() {
        let (_tmp, store) = store();
        let assessment = seeded(&store);

        let summaries = store
            .list_assessment_summaries(&assessment.project_id, None)
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].assessment_id, assessment.assessment_id);
        assert_eq!(summaries[0].version_count, 0);
        assert_eq!(summaries[0].latest_version_number, None);

        let err = store.list_assessment_summaries("missing", None).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "project", .. }));
    }

    #[test]
    fn recent_lists_respect_limit() {
        let (_tmp, store) = store();
        let assessment = seeded(&store);
        for i in 0..4 {
            store
                .create_version(&assessment.assessment_id, new_version(&format!("t{i}")))
                .unwrap();
        }
        let recent = store.list_recent_versions(Some(2)).unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].created_at >= recent[1].created_at);
        assert_eq!(store.list_recent_versions(Some(0)).unwrap().len(), 1);
    }

    #[test]
    fn handles_are_shared_per_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shared.json");
        let a = AssessmentStore::open(&path);
        let b = AssessmentStore::open(&path);
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
        let other = AssessmentStore::open(tmp.path().join("other.json"));
        assert!(!Arc::ptr_eq(&a.inner, &other.inner));
    }

    #[test]
    fn equivalent_spellings_of_a_path_share_a_handle() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        let direct = AssessmentStore::open(tmp.path().join("store.json"));
        let dotted = AssessmentStore::open(tmp.path().join("sub").join("..").join("store.json"));
        assert!(Arc::ptr_eq(&direct.inner, &dotted.inner));
    }

    #[test]
    fn failed_transaction_writes_nothing() {
        let (_tmp, store) = store();
        let result: Result<()> = store.transact(|doc| {
            doc.extra
                .insert("scratch".to_string(), serde_json::Value::Bool(true));
            Err(StoreError::invalid("abort"))
        });
        assert!(result.is_err());
        assert!(!store.path().exists());
    }
}
