//! Canonical domain types. Every gateway input is shaped to this model at
//! ingress; nothing downstream sees alternate field naming.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub type TenantId = String;

/// The sentinel value recorded on an HRSN field when the dictionary entry
/// that produced the mention flags it as a social need.
pub const HRSN_PROBLEM_IDENTIFIED: &str = "Problem Identified";

pub const HRSN_CODE_ZCODE: &str = "ZCode/HRSN";
pub const HRSN_CODE_NONE: &str = "No";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographics {
    pub age_bucket: Option<String>,
    pub gender: Option<String>,
    pub race: Option<String>,
    pub ethnicity: Option<String>,
    pub zip: Option<String>,
    pub education: Option<String>,
    pub veteran_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub tenant_id: TenantId,
    pub patient_id: String,
    pub display_name: Option<String>,
    pub demographics: Demographics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub tenant_id: TenantId,
    pub patient_id: String,
    pub date_of_service: NaiveDate,
    pub text: String,
    pub provider_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Symptom,
    Problem,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Symptom => "symptom",
            EntryKind::Problem => "problem",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "symptom" => Some(EntryKind::Symptom),
            "problem" => Some(EntryKind::Problem),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HrsnCategory {
    HousingStatus,
    FoodStatus,
    FinancialStatus,
    TransportationNeeds,
    HasACar,
    UtilityInsecurity,
    ChildcareNeeds,
    ElderCareNeeds,
    EmploymentStatus,
    EducationNeeds,
    LegalNeeds,
    SocialIsolation,
}

impl HrsnCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            HrsnCategory::HousingStatus => "housing_status",
            HrsnCategory::FoodStatus => "food_status",
            HrsnCategory::FinancialStatus => "financial_status",
            HrsnCategory::TransportationNeeds => "transportation_needs",
            HrsnCategory::HasACar => "has_a_car",
            HrsnCategory::UtilityInsecurity => "utility_insecurity",
            HrsnCategory::ChildcareNeeds => "childcare_needs",
            HrsnCategory::ElderCareNeeds => "elder_care_needs",
            HrsnCategory::EmploymentStatus => "employment_status",
            HrsnCategory::EducationNeeds => "education_needs",
            HrsnCategory::LegalNeeds => "legal_needs",
            HrsnCategory::SocialIsolation => "social_isolation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "housing_status" => Some(HrsnCategory::HousingStatus),
            "food_status" => Some(HrsnCategory::FoodStatus),
            "financial_status" => Some(HrsnCategory::FinancialStatus),
            "transportation_needs" => Some(HrsnCategory::TransportationNeeds),
            "has_a_car" => Some(HrsnCategory::HasACar),
            "utility_insecurity" => Some(HrsnCategory::UtilityInsecurity),
            "childcare_needs" => Some(HrsnCategory::ChildcareNeeds),
            "elder_care_needs" => Some(HrsnCategory::ElderCareNeeds),
            "employment_status" => Some(HrsnCategory::EmploymentStatus),
            "education_needs" => Some(HrsnCategory::EducationNeeds),
            "legal_needs" => Some(HrsnCategory::LegalNeeds),
            "social_isolation" => Some(HrsnCategory::SocialIsolation),
            _ => None,
        }
    }

    pub const ALL: [HrsnCategory; 12] = [
        HrsnCategory::HousingStatus,
        HrsnCategory::FoodStatus,
        HrsnCategory::FinancialStatus,
        HrsnCategory::TransportationNeeds,
        HrsnCategory::HasACar,
        HrsnCategory::UtilityInsecurity,
        HrsnCategory::ChildcareNeeds,
        HrsnCategory::ElderCareNeeds,
        HrsnCategory::EmploymentStatus,
        HrsnCategory::EducationNeeds,
        HrsnCategory::LegalNeeds,
        HrsnCategory::SocialIsolation,
    ];
}

/// One flag per HRSN category; at most one is set, and only when the
/// originating entry's `kind = Problem`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HrsnFlags {
    pub housing_status: Option<String>,
    pub food_status: Option<String>,
    pub financial_status: Option<String>,
    pub transportation_needs: Option<String>,
    pub has_a_car: Option<String>,
    pub utility_insecurity: Option<String>,
    pub childcare_needs: Option<String>,
    pub elder_care_needs: Option<String>,
    pub employment_status: Option<String>,
    pub education_needs: Option<String>,
    pub legal_needs: Option<String>,
    pub social_isolation: Option<String>,
}

impl HrsnFlags {
    pub fn set(category: HrsnCategory) -> Self {
        let mut flags = HrsnFlags::default();
        let slot = flags.field_mut(category);
        *slot = Some(HRSN_PROBLEM_IDENTIFIED.to_string());
        flags
    }

    fn field_mut(&mut self, category: HrsnCategory) -> &mut Option<String> {
        match category {
            HrsnCategory::HousingStatus => &mut self.housing_status,
            HrsnCategory::FoodStatus => &mut self.food_status,
            HrsnCategory::FinancialStatus => &mut self.financial_status,
            HrsnCategory::TransportationNeeds => &mut self.transportation_needs,
            HrsnCategory::HasACar => &mut self.has_a_car,
            HrsnCategory::UtilityInsecurity => &mut self.utility_insecurity,
            HrsnCategory::ChildcareNeeds => &mut self.childcare_needs,
            HrsnCategory::ElderCareNeeds => &mut self.elder_care_needs,
            HrsnCategory::EmploymentStatus => &mut self.employment_status,
            HrsnCategory::EducationNeeds => &mut self.education_needs,
            HrsnCategory::LegalNeeds => &mut self.legal_needs,
            HrsnCategory::SocialIsolation => &mut self.social_isolation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub tenant_id: TenantId,
    pub symptom_id: String,
    pub segment: String,
    pub diagnosis: Option<String>,
    pub diagnosis_code: Option<String>,
    pub diagnostic_category: Option<String>,
    pub kind: EntryKind,
    pub hrsn_code: Option<String>,
    pub hrsn_mapping: Option<HrsnCategory>,
}

impl DictionaryEntry {
    /// The seven attributes compared for exact-duplicate detection at load
    /// time — everything except `tenant_id`, which is implied by the
    /// dictionary being loaded per-tenant.
    pub fn dedup_key(&self) -> (
        &str,
        &str,
        Option<&str>,
        Option<&str>,
        EntryKind,
        Option<&str>,
        Option<HrsnCategory>,
    ) {
        (
            self.symptom_id.as_str(),
            self.segment.as_str(),
            self.diagnosis.as_deref(),
            self.diagnostic_category.as_deref(),
            self.kind,
            self.hrsn_code.as_deref(),
            self.hrsn_mapping,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub mention_id: String,
    pub tenant_id: TenantId,
    pub patient_id: String,
    pub date_of_service: NaiveDate,
    pub symptom_id: String,
    pub segment: String,
    pub diagnosis: Option<String>,
    pub diagnosis_code: Option<String>,
    pub diagnostic_category: Option<String>,
    pub kind: EntryKind,
    pub hrsn_code: String,
    pub position_in_text: i64,
    pub present: String,
    pub detected: String,
    pub validated: String,
    pub hrsn_flags: HrsnFlags,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Upload,
    Extraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgressCounters {
    pub processed: u64,
    pub total: u64,
    pub rate_per_sec: f64,
    pub eta_sec: Option<f64>,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub tenant_id: TenantId,
    pub kind: JobKind,
    pub state: JobState,
    pub started_at: Option<NaiveDateTime>,
    pub ended_at: Option<NaiveDateTime>,
    pub progress: JobProgressCounters,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub tenant_id: TenantId,
    pub process_type: String,
    pub state: String,
    pub percentage: i32,
    pub message: String,
    pub stage: String,
    pub total_items: Option<i64>,
    pub processed_items: Option<i64>,
    pub last_update: Option<NaiveDateTime>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub error: Option<String>,
}
