//! Personnel performance table
//!
//! Builds the aggregate career view: one annotated row per visible employee,
//! carrying the latest pay, seniority and org-assignment state as of an
//! optional historical date, plus committee appearance counts bucketed by
//! Persian calendar year. Filtering, ordering and pagination happen in
//! memory after the per-row safety check.

use chrono::{DateTime, NaiveDate, Utc};
use compass_common::jalali;
use compass_common::models::User;
use compass_common::{Error, Result};
use serde::Serialize;
use sqlx::SqliteConnection;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::db;
use crate::services::visibility;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 500;

const TEXT_FIELDS: &[&str] = &[
    "email",
    "display_name",
    "leader",
    "team",
    "tribe",
    "chapter",
    "department",
    "ladder_code",
    "ladder_name",
    "seniority_level",
    "last_committee_date",
    "last_bonus_date",
    "last_salary_change_date",
    "is_mapped",
];

const NUM_FIELDS: &[&str] = &[
    "overall_score",
    "pay_band_number",
    "last_salary_change",
    "last_bonus_percentage",
    "committees_this_year",
    "committees_last_year",
];

const FILTER_OPS: &[&str] = &["exact", "eq", "istartswith", "in", "gt", "gte", "lt", "lte"];

/// Query parameters of the table endpoint. Reserved keys control shape,
/// every other key/value pair is treated as a column filter.
#[derive(Debug, Clone)]
pub struct TableParams {
    pub as_of: Option<NaiveDate>,
    pub filters: Vec<(String, String)>,
    pub ordering: Vec<String>,
    pub page: i64,
    pub page_size: i64,
}

impl TableParams {
    pub fn from_query(query: &HashMap<String, String>) -> Result<Self> {
        let mut params = TableParams {
            as_of: None,
            filters: Vec::new(),
            ordering: Vec::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        };

        for (key, value) in query {
            match key.as_str() {
                "as_of" => {
                    let date = NaiveDate::parse_from_str(value, db::DATE_FORMAT)
                        .map_err(|_| Error::InvalidInput(format!("Bad as_of date: {}", value)))?;
                    params.as_of = Some(date);
                }
                "ordering" => {
                    params.ordering = value
                        .split(',')
                        .map(str::trim)
                        .filter(|key| !key.is_empty())
                        .map(String::from)
                        .collect();
                }
                "page" => {
                    params.page = value
                        .parse()
                        .map_err(|_| Error::InvalidInput(format!("Bad page: {}", value)))?;
                    if params.page < 1 {
                        return Err(Error::InvalidInput(format!("Bad page: {}", value)));
                    }
                }
                "page_size" => {
                    params.page_size = value
                        .parse()
                        .map_err(|_| Error::InvalidInput(format!("Bad page size: {}", value)))?;
                    if params.page_size < 1 {
                        return Err(Error::InvalidInput(format!("Bad page size: {}", value)));
                    }
                    // Oversized requests are clamped rather than rejected
                    params.page_size = params.page_size.min(MAX_PAGE_SIZE);
                }
                _ => params.filters.push((key.clone(), value.clone())),
            }
        }

        Ok(params)
    }
}

/// One employee in the table. Org names come from the assignment snapshot
/// history, not the live org graph, so historical `as_of` queries show where
/// the person sat at the time.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceRow {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub leader: Option<String>,
    pub team: Option<String>,
    pub tribe: Option<String>,
    pub chapter: Option<String>,
    pub department: Option<String>,
    pub ladder_code: Option<String>,
    pub ladder_name: Option<String>,
    pub overall_score: Option<f64>,
    pub seniority_level: Option<String>,
    /// Absolute level per ladder aspect code from the latest snapshot
    pub details: BTreeMap<String, i64>,
    pub pay_band_number: Option<f64>,
    /// Salary change recorded on the latest pay snapshot, zero for
    /// bonus-only rows
    pub last_salary_change: Option<f64>,
    pub last_salary_change_date: Option<NaiveDate>,
    pub last_bonus_date: Option<NaiveDate>,
    pub last_bonus_percentage: Option<i64>,
    pub last_committee_date: Option<NaiveDate>,
    pub committees_this_year: i64,
    pub committees_last_year: i64,
    /// Whether the user has ever been mapped to a ladder, regardless of
    /// the `as_of` cutoff
    pub is_mapped: bool,
}

#[derive(Debug, Serialize)]
pub struct TablePage {
    pub rows: Vec<PerformanceRow>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

/// Assemble the table for one viewer: visible population, per-row safety
/// check, annotation, then in-memory filter / order / paginate.
pub async fn build_table(
    conn: &mut SqliteConnection,
    viewer: &User,
    params: &TableParams,
) -> Result<TablePage> {
    let ids = visibility::visible_user_ids(&mut *conn, viewer).await?;

    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(user) = db::users::find_user(&mut *conn, id).await? else {
            continue;
        };
        if !visibility::can_view_timeline(&mut *conn, viewer, &user).await? {
            continue;
        }
        rows.push(annotate(&mut *conn, &user, params.as_of).await?);
    }

    apply_filters(&mut rows, &params.filters);
    apply_ordering(&mut rows, &params.ordering);

    let total = rows.len() as i64;
    let start = ((params.page - 1) * params.page_size) as usize;
    let rows: Vec<PerformanceRow> = rows
        .into_iter()
        .skip(start)
        .take(params.page_size as usize)
        .collect();

    Ok(TablePage {
        rows,
        total,
        page: params.page,
        page_size: params.page_size,
    })
}

async fn annotate(
    conn: &mut SqliteConnection,
    user: &User,
    as_of: Option<NaiveDate>,
) -> Result<PerformanceRow> {
    let assignment = db::snapshots::latest_org_assignment_as_of(&mut *conn, user.id, as_of).await?;
    let mut leader = None;
    let mut team = None;
    let mut tribe = None;
    let mut chapter = None;
    let mut department = None;
    if let Some(assignment) = &assignment {
        if let Some(id) = assignment.leader_id {
            leader = db::users::find_user(&mut *conn, id)
                .await?
                .map(|u| u.display_name);
        }
        if let Some(id) = assignment.team_id {
            team = db::orgs::find_team(&mut *conn, id).await?.map(|t| t.name);
        }
        if let Some(id) = assignment.tribe_id {
            tribe = db::orgs::find_tribe(&mut *conn, id).await?.map(|t| t.name);
        }
        if let Some(id) = assignment.chapter_id {
            chapter = db::orgs::find_chapter(&mut *conn, id).await?.map(|c| c.name);
        }
        if let Some(id) = assignment.department_id {
            department = db::orgs::find_department(&mut *conn, id)
                .await?
                .map(|d| d.name);
        }
    }

    let seniority = db::snapshots::latest_seniority_as_of(&mut *conn, user.id, as_of).await?;
    let (ladder_code, ladder_name, overall_score, seniority_level, details) = match seniority {
        Some(snapshot) => {
            let ladder = db::ladders::get_ladder(&mut *conn, snapshot.ladder_id).await?;
            (
                Some(ladder.code),
                Some(ladder.name),
                Some(snapshot.overall_score),
                snapshot.seniority_level.map(|l| l.as_str().to_string()),
                snapshot.details,
            )
        }
        None => (None, None, None, None, BTreeMap::new()),
    };

    let compensation = db::snapshots::latest_compensation_as_of(&mut *conn, user.id, as_of).await?;
    let pay_band_number = compensation.as_ref().map(|c| c.pay_band_number);
    let last_salary_change = compensation.as_ref().map(|c| c.salary_change);
    let last_salary_change_date =
        db::snapshots::last_nonzero_salary_change(&mut *conn, user.id, as_of).await?;
    let (last_bonus_date, last_bonus_percentage) =
        match db::snapshots::last_nonzero_bonus(&mut *conn, user.id, as_of).await? {
            Some((date, percentage)) => (Some(date), Some(percentage)),
            None => (None, None),
        };

    let anchor = as_of.unwrap_or_else(|| Utc::now().date_naive());
    let committee_dates: Vec<NaiveDate> = db::summaries::committee_effective_dates(&mut *conn, user.id)
        .await?
        .into_iter()
        .filter(|date| *date <= anchor)
        .collect();
    // Dates arrive sorted ascending
    let last_committee_date = committee_dates.last().copied();
    let ((current_start, current_end), (previous_start, previous_end)) =
        jalali::committee_year_windows(anchor)?;
    let committees_this_year = committee_dates
        .iter()
        .filter(|date| **date >= current_start && **date <= current_end)
        .count() as i64;
    let committees_last_year = committee_dates
        .iter()
        .filter(|date| **date >= previous_start && **date <= previous_end)
        .count() as i64;

    let is_mapped = db::snapshots::has_any_seniority(&mut *conn, user.id).await?;

    Ok(PerformanceRow {
        user_id: user.id,
        email: user.email.clone(),
        display_name: user.display_name.clone(),
        leader,
        team,
        tribe,
        chapter,
        department,
        ladder_code,
        ladder_name,
        overall_score,
        seniority_level,
        details,
        pay_band_number,
        last_salary_change,
        last_salary_change_date,
        last_bonus_date,
        last_bonus_percentage,
        last_committee_date,
        committees_this_year,
        committees_last_year,
        is_mapped,
    })
}

/// Column value with its null state kept explicit so ordering can push
/// missing values to the end in either direction
enum FieldValue {
    Text(Option<String>),
    Num(Option<f64>),
}

impl FieldValue {
    fn is_null(&self) -> bool {
        matches!(self, FieldValue::Text(None) | FieldValue::Num(None))
    }

    fn cmp_non_null(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Text(Some(left)), FieldValue::Text(Some(right))) => left.cmp(right),
            (FieldValue::Num(Some(left)), FieldValue::Num(Some(right))) => {
                left.partial_cmp(right).unwrap_or(Ordering::Equal)
            }
            _ => Ordering::Equal,
        }
    }
}

fn known_field(field: &str) -> bool {
    field.starts_with("aspect_") || TEXT_FIELDS.contains(&field) || NUM_FIELDS.contains(&field)
}

fn field_value(row: &PerformanceRow, field: &str) -> Option<FieldValue> {
    if let Some(code) = field.strip_prefix("aspect_") {
        return Some(FieldValue::Num(row.details.get(code).map(|v| *v as f64)));
    }
    let value = match field {
        "email" => FieldValue::Text(Some(row.email.clone())),
        "display_name" => FieldValue::Text(Some(row.display_name.clone())),
        "leader" => FieldValue::Text(row.leader.clone()),
        "team" => FieldValue::Text(row.team.clone()),
        "tribe" => FieldValue::Text(row.tribe.clone()),
        "chapter" => FieldValue::Text(row.chapter.clone()),
        "department" => FieldValue::Text(row.department.clone()),
        "ladder_code" => FieldValue::Text(row.ladder_code.clone()),
        "ladder_name" => FieldValue::Text(row.ladder_name.clone()),
        "seniority_level" => FieldValue::Text(row.seniority_level.clone()),
        "overall_score" => FieldValue::Num(row.overall_score),
        "pay_band_number" => FieldValue::Num(row.pay_band_number),
        "last_salary_change" => FieldValue::Num(row.last_salary_change),
        "last_bonus_percentage" => FieldValue::Num(row.last_bonus_percentage.map(|v| v as f64)),
        "committees_this_year" => FieldValue::Num(Some(row.committees_this_year as f64)),
        "committees_last_year" => FieldValue::Num(Some(row.committees_last_year as f64)),
        // ISO dates compare correctly as text
        "last_committee_date" => FieldValue::Text(row.last_committee_date.map(|d| d.to_string())),
        "last_bonus_date" => FieldValue::Text(row.last_bonus_date.map(|d| d.to_string())),
        "last_salary_change_date" => {
            FieldValue::Text(row.last_salary_change_date.map(|d| d.to_string()))
        }
        "is_mapped" => FieldValue::Text(Some(row.is_mapped.to_string())),
        _ => return None,
    };
    Some(value)
}

fn split_filter_key(key: &str) -> (&str, &str) {
    match key.rsplit_once("__") {
        Some((field, op)) if FILTER_OPS.contains(&op) => (field, op),
        _ => (key, "exact"),
    }
}

/// Unknown fields, unknown operators and unparseable numeric operands leave
/// the filter inert; they never drop rows on their own.
fn apply_filters(rows: &mut Vec<PerformanceRow>, filters: &[(String, String)]) {
    for (key, operand) in filters {
        let (field, op) = split_filter_key(key);
        if !known_field(field) {
            continue;
        }
        rows.retain(|row| filter_keeps(row, field, op, operand));
    }
}

fn filter_keeps(row: &PerformanceRow, field: &str, op: &str, operand: &str) -> bool {
    let Some(value) = field_value(row, field) else {
        return true;
    };
    match (value, op) {
        (FieldValue::Text(held), "exact" | "eq") => held.as_deref() == Some(operand),
        (FieldValue::Text(held), "istartswith") => held
            .map(|s| s.to_lowercase().starts_with(&operand.to_lowercase()))
            .unwrap_or(false),
        (FieldValue::Text(held), "in") => held
            .map(|s| operand.split(',').any(|candidate| candidate.trim() == s))
            .unwrap_or(false),
        (FieldValue::Text(held), "gt" | "gte" | "lt" | "lte") => match held {
            Some(s) => match op {
                "gt" => s.as_str() > operand,
                "gte" => s.as_str() >= operand,
                "lt" => s.as_str() < operand,
                _ => s.as_str() <= operand,
            },
            None => false,
        },
        (FieldValue::Num(held), "in") => match held {
            Some(actual) => operand
                .split(',')
                .filter_map(|candidate| candidate.trim().parse::<f64>().ok())
                .any(|candidate| (actual - candidate).abs() < f64::EPSILON),
            None => false,
        },
        (FieldValue::Num(held), "exact" | "eq" | "gt" | "gte" | "lt" | "lte") => {
            let Ok(wanted) = operand.parse::<f64>() else {
                return true;
            };
            match held {
                Some(actual) => match op {
                    "exact" | "eq" => (actual - wanted).abs() < f64::EPSILON,
                    "gt" => actual > wanted,
                    "gte" => actual >= wanted,
                    "lt" => actual < wanted,
                    _ => actual <= wanted,
                },
                None => false,
            }
        }
        _ => true,
    }
}

/// Sort by the requested keys with `-` reversing direction. Null values sort
/// last regardless of direction; unknown keys are dropped. Display name is
/// the final tiebreak so pagination stays stable.
fn apply_ordering(rows: &mut [PerformanceRow], ordering: &[String]) {
    let keys: Vec<(String, bool)> = ordering
        .iter()
        .filter_map(|raw| {
            let (name, descending) = match raw.strip_prefix('-') {
                Some(name) => (name, true),
                None => (raw.as_str(), false),
            };
            known_field(name).then(|| (name.to_string(), descending))
        })
        .collect();

    rows.sort_by(|a, b| {
        for (field, descending) in &keys {
            let ord = compare_rows(a, b, field, *descending);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.display_name.cmp(&b.display_name)
    });
}

fn compare_rows(a: &PerformanceRow, b: &PerformanceRow, field: &str, descending: bool) -> Ordering {
    let left = field_value(a, field).unwrap_or(FieldValue::Text(None));
    let right = field_value(b, field).unwrap_or(FieldValue::Text(None));
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = left.cmp_non_null(&right);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
    }
}

pub fn csv_filename(as_of: Option<NaiveDate>, now: DateTime<Utc>) -> String {
    let stamp = now.format("%Y%m%d_%H%M%S");
    match as_of {
        Some(date) => format!("personnel-performance_asOf-{}_{}.csv", date, stamp),
        None => format!("personnel-performance_current_{}.csv", stamp),
    }
}

const CSV_HEADER: &[&str] = &[
    "email",
    "display_name",
    "leader",
    "team",
    "tribe",
    "chapter",
    "department",
    "ladder_code",
    "ladder_name",
    "overall_score",
    "seniority_level",
    "details",
    "pay_band_number",
    "last_salary_change",
    "last_salary_change_date",
    "last_bonus_date",
    "last_bonus_percentage",
    "last_committee_date",
    "committees_this_year",
    "committees_last_year",
    "is_mapped",
];

pub fn to_csv(rows: &[PerformanceRow]) -> String {
    fn text(value: &Option<String>) -> String {
        value.clone().unwrap_or_default()
    }
    fn num(value: Option<f64>) -> String {
        value.map(|v| v.to_string()).unwrap_or_default()
    }
    fn int(value: Option<i64>) -> String {
        value.map(|v| v.to_string()).unwrap_or_default()
    }
    fn date(value: Option<NaiveDate>) -> String {
        value.map(|d| d.to_string()).unwrap_or_default()
    }

    let mut out = CSV_HEADER.join(",");
    out.push('\n');
    for row in rows {
        let details = serde_json::to_string(&row.details).unwrap_or_default();
        let fields = [
            row.email.clone(),
            row.display_name.clone(),
            text(&row.leader),
            text(&row.team),
            text(&row.tribe),
            text(&row.chapter),
            text(&row.department),
            text(&row.ladder_code),
            text(&row.ladder_name),
            num(row.overall_score),
            text(&row.seniority_level),
            details,
            num(row.pay_band_number),
            num(row.last_salary_change),
            date(row.last_salary_change_date),
            date(row.last_bonus_date),
            int(row.last_bonus_percentage),
            date(row.last_committee_date),
            row.committees_this_year.to_string(),
            row.committees_last_year.to_string(),
            row.is_mapped.to_string(),
        ];
        let line: Vec<String> = fields.iter().map(|field| csv_escape(field)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;
    use chrono::TimeZone;
    use compass_common::models::{CompensationSnapshot, OrgAssignmentSnapshot, ProposalType};

    fn d(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    async fn insert_users(conn: &mut SqliteConnection, users: &[&User]) {
        for user in users {
            db::users::insert_user(&mut *conn, user).await.unwrap();
        }
    }

    async fn seed_hr(conn: &mut SqliteConnection) -> User {
        let hr = test_util::user("hr@compass.io");
        db::users::insert_user(&mut *conn, &hr).await.unwrap();
        let mut org = test_util::organization("Compass");
        org.hr_manager = Some(hr.id);
        db::orgs::insert_organization(&mut *conn, &org).await.unwrap();
        hr
    }

    async fn seed_committee_summary(
        conn: &mut SqliteConnection,
        owner_id: Uuid,
        committee_date: NaiveDate,
    ) {
        let note = test_util::proposal(owner_id, ProposalType::Evaluation);
        db::notes::insert_note(&mut *conn, &note).await.unwrap();
        let mut summary = test_util::summary(note.id);
        summary.committee_date = Some(committee_date);
        db::summaries::insert_summary(&mut *conn, &summary)
            .await
            .unwrap();
    }

    async fn seed_compensation(
        conn: &mut SqliteConnection,
        user_id: Uuid,
        band: f64,
        change: f64,
        bonus: i64,
        date: NaiveDate,
    ) {
        let band_row = db::ladders::get_or_create_pay_band(&mut *conn, band)
            .await
            .unwrap();
        db::snapshots::insert_compensation(
            &mut *conn,
            &CompensationSnapshot {
                id: Uuid::new_v4(),
                user_id,
                pay_band_id: band_row.id,
                pay_band_number: band,
                salary_change: change,
                bonus_percentage: bonus,
                effective_date: date,
                source_summary_id: None,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
    }

    async fn seed_seniority(
        conn: &mut SqliteConnection,
        user_id: Uuid,
        ladder_id: Uuid,
        overall: f64,
        eng_level: i64,
        date: NaiveDate,
    ) {
        let mut snapshot = test_util::seniority_snapshot(user_id, ladder_id);
        snapshot.overall_score = overall;
        snapshot.details.insert("ENG".to_string(), eng_level);
        snapshot.effective_date = date;
        db::snapshots::insert_seniority(&mut *conn, &snapshot)
            .await
            .unwrap();
    }

    fn bare_params() -> TableParams {
        TableParams {
            as_of: None,
            filters: Vec::new(),
            ordering: Vec::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[test]
    fn test_params_parse_query() {
        let mut query = HashMap::new();
        query.insert("as_of".to_string(), "2024-06-01".to_string());
        query.insert("ordering".to_string(), "-overall_score, team".to_string());
        query.insert("page".to_string(), "2".to_string());
        query.insert("page_size".to_string(), "25".to_string());
        query.insert("team".to_string(), "Sales".to_string());
        query.insert("aspect_ENG__gte".to_string(), "2".to_string());

        let params = TableParams::from_query(&query).unwrap();
        assert_eq!(params.as_of, Some(d(2024, 6, 1)));
        assert_eq!(params.ordering, vec!["-overall_score", "team"]);
        assert_eq!(params.page, 2);
        assert_eq!(params.page_size, 25);
        assert_eq!(params.filters.len(), 2);
    }

    #[test]
    fn test_params_reject_malformed() {
        let mut query = HashMap::new();
        query.insert("as_of".to_string(), "last tuesday".to_string());
        assert!(matches!(
            TableParams::from_query(&query),
            Err(Error::InvalidInput(_))
        ));

        let mut query = HashMap::new();
        query.insert("page".to_string(), "zero".to_string());
        assert!(TableParams::from_query(&query).is_err());

        let mut query = HashMap::new();
        query.insert("page".to_string(), "0".to_string());
        assert!(TableParams::from_query(&query).is_err());

        let mut query = HashMap::new();
        query.insert("page_size".to_string(), "0".to_string());
        assert!(TableParams::from_query(&query).is_err());

        let mut query = HashMap::new();
        query.insert("page_size".to_string(), "9999".to_string());
        let params = TableParams::from_query(&query).unwrap();
        assert_eq!(params.page_size, MAX_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_counts_committees_by_persian_year() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let hr = seed_hr(&mut conn).await;
        let employee = test_util::user("employee@compass.io");
        db::users::insert_user(&mut conn, &employee).await.unwrap();

        // One in the previous Persian year, one in the current, one after
        // the as_of cutoff
        seed_committee_summary(&mut conn, employee.id, d(2023, 6, 15)).await;
        seed_committee_summary(&mut conn, employee.id, d(2024, 4, 10)).await;
        seed_committee_summary(&mut conn, employee.id, d(2024, 8, 1)).await;

        let mut params = bare_params();
        params.as_of = Some(d(2024, 6, 1));
        let page = build_table(&mut conn, &hr, &params).await.unwrap();

        assert_eq!(page.total, 2);
        let row = page
            .rows
            .iter()
            .find(|row| row.user_id == employee.id)
            .unwrap();
        assert_eq!(row.committees_this_year, 1);
        assert_eq!(row.committees_last_year, 1);
        assert_eq!(row.last_committee_date, Some(d(2024, 4, 10)));
        assert!(!row.is_mapped);
    }

    #[tokio::test]
    async fn test_as_of_rewinds_snapshots() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let hr = seed_hr(&mut conn).await;
        let boss = test_util::user("boss@compass.io");
        let employee = test_util::user("employee@compass.io");
        insert_users(&mut conn, &[&boss, &employee]).await;

        let tribe = test_util::tribe("Ops");
        db::orgs::insert_tribe(&mut conn, &tribe).await.unwrap();
        let mut team = test_util::team("Avengers");
        team.tribe_id = Some(tribe.id);
        db::orgs::insert_team(&mut conn, &team).await.unwrap();

        db::snapshots::insert_org_assignment(
            &mut conn,
            &OrgAssignmentSnapshot {
                id: Uuid::new_v4(),
                user_id: employee.id,
                leader_id: Some(boss.id),
                team_id: Some(team.id),
                tribe_id: Some(tribe.id),
                chapter_id: None,
                department_id: None,
                effective_date: d(2024, 1, 1),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();

        let ladder = test_util::ladder("SW", "Software");
        db::ladders::insert_ladder(&mut conn, &ladder).await.unwrap();
        seed_seniority(&mut conn, employee.id, ladder.id, 1.0, 1, d(2024, 1, 10)).await;
        seed_seniority(&mut conn, employee.id, ladder.id, 2.0, 2, d(2024, 5, 10)).await;
        seed_compensation(&mut conn, employee.id, 3.0, 0.5, 25, d(2024, 1, 10)).await;
        seed_compensation(&mut conn, employee.id, 3.5, 0.5, 20, d(2024, 5, 10)).await;

        let mut params = bare_params();
        params.as_of = Some(d(2024, 2, 1));
        let page = build_table(&mut conn, &hr, &params).await.unwrap();
        let row = page
            .rows
            .iter()
            .find(|row| row.user_id == employee.id)
            .unwrap();
        assert_eq!(row.overall_score, Some(1.0));
        assert_eq!(row.details.get("ENG"), Some(&1));
        assert_eq!(row.pay_band_number, Some(3.0));
        assert_eq!(row.last_bonus_date, Some(d(2024, 1, 10)));
        assert_eq!(row.last_bonus_percentage, Some(25));
        assert_eq!(row.team.as_deref(), Some("Avengers"));
        assert_eq!(row.tribe.as_deref(), Some("Ops"));
        assert_eq!(row.leader.as_deref(), Some("boss"));
        assert_eq!(row.ladder_code.as_deref(), Some("SW"));
        assert!(row.is_mapped);

        let page = build_table(&mut conn, &hr, &bare_params()).await.unwrap();
        let row = page
            .rows
            .iter()
            .find(|row| row.user_id == employee.id)
            .unwrap();
        assert_eq!(row.overall_score, Some(2.0));
        assert_eq!(row.pay_band_number, Some(3.5));
        assert_eq!(row.last_bonus_percentage, Some(20));
    }

    #[tokio::test]
    async fn test_filters_restrict_rows() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let hr = seed_hr(&mut conn).await;
        let alice = test_util::user("alice@compass.io");
        let bob = test_util::user("bob@compass.io");
        insert_users(&mut conn, &[&alice, &bob]).await;

        let team = test_util::team("Sales");
        db::orgs::insert_team(&mut conn, &team).await.unwrap();
        for user_id in [alice.id, bob.id] {
            db::snapshots::insert_org_assignment(
                &mut conn,
                &OrgAssignmentSnapshot {
                    id: Uuid::new_v4(),
                    user_id,
                    leader_id: None,
                    team_id: Some(team.id),
                    tribe_id: None,
                    chapter_id: None,
                    department_id: None,
                    effective_date: d(2024, 1, 1),
                    created_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        }

        let ladder = test_util::ladder("SW", "Software");
        db::ladders::insert_ladder(&mut conn, &ladder).await.unwrap();
        seed_seniority(&mut conn, alice.id, ladder.id, 2.0, 3, d(2024, 1, 10)).await;
        seed_seniority(&mut conn, bob.id, ladder.id, 1.0, 1, d(2024, 1, 10)).await;

        // Team filter drops the HR viewer, who has no assignment snapshot
        let mut params = bare_params();
        params.filters = vec![("team".to_string(), "Sales".to_string())];
        let page = build_table(&mut conn, &hr, &params).await.unwrap();
        assert_eq!(page.total, 2);

        let mut params = bare_params();
        params.filters = vec![("email__istartswith".to_string(), "AL".to_string())];
        let page = build_table(&mut conn, &hr, &params).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].user_id, alice.id);

        let mut params = bare_params();
        params.filters = vec![("aspect_ENG__gte".to_string(), "2".to_string())];
        let page = build_table(&mut conn, &hr, &params).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].user_id, alice.id);

        let mut params = bare_params();
        params.filters = vec![
            ("favourite_colour".to_string(), "blue".to_string()),
            ("overall_score__gt".to_string(), "not a number".to_string()),
        ];
        let page = build_table(&mut conn, &hr, &params).await.unwrap();
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_ordering_puts_nulls_last() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let hr = seed_hr(&mut conn).await;
        let alice = test_util::user("alice@compass.io");
        let bob = test_util::user("bob@compass.io");
        let carol = test_util::user("carol@compass.io");
        insert_users(&mut conn, &[&alice, &bob, &carol]).await;

        let ladder = test_util::ladder("SW", "Software");
        db::ladders::insert_ladder(&mut conn, &ladder).await.unwrap();
        seed_seniority(&mut conn, alice.id, ladder.id, 1.0, 1, d(2024, 1, 10)).await;
        seed_seniority(&mut conn, bob.id, ladder.id, 2.0, 2, d(2024, 1, 10)).await;
        // carol and hr stay unmapped

        let mut params = bare_params();
        params.ordering = vec!["-overall_score".to_string(), "hat_size".to_string()];
        let page = build_table(&mut conn, &hr, &params).await.unwrap();

        let ids: Vec<Uuid> = page.rows.iter().map(|row| row.user_id).collect();
        assert_eq!(ids[0], bob.id);
        assert_eq!(ids[1], alice.id);
        // Nulls trail in display-name order
        assert_eq!(ids[2], carol.id);
        assert_eq!(ids[3], hr.id);
    }

    #[tokio::test]
    async fn test_pagination_slices_after_ordering() {
        let pool = test_util::memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let hr = seed_hr(&mut conn).await;
        for email in ["a@compass.io", "b@compass.io", "c@compass.io"] {
            let user = test_util::user(email);
            db::users::insert_user(&mut conn, &user).await.unwrap();
        }

        let mut params = bare_params();
        params.page_size = 3;
        params.page = 2;
        let page = build_table(&mut conn, &hr, &params).await.unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.rows.len(), 1);
        // Default order is display name, so the second page holds "hr"
        assert_eq!(page.rows[0].user_id, hr.id);

        params.page = 5;
        let page = build_table(&mut conn, &hr, &params).await.unwrap();
        assert_eq!(page.total, 4);
        assert!(page.rows.is_empty());
    }

    #[test]
    fn test_csv_escapes_and_builds_filename() {
        let mut details = BTreeMap::new();
        details.insert("ENG".to_string(), 3);
        let row = PerformanceRow {
            user_id: Uuid::new_v4(),
            email: "alice@compass.io".to_string(),
            display_name: "Dr. \"Alice\", PhD".to_string(),
            leader: None,
            team: Some("Sales".to_string()),
            tribe: None,
            chapter: None,
            department: None,
            ladder_code: Some("SW".to_string()),
            ladder_name: Some("Software".to_string()),
            overall_score: Some(2.5),
            seniority_level: Some("SENIOR".to_string()),
            details,
            pay_band_number: Some(3.5),
            last_salary_change: Some(0.5),
            last_salary_change_date: Some(d(2024, 5, 10)),
            last_bonus_date: None,
            last_bonus_percentage: None,
            last_committee_date: Some(d(2024, 5, 10)),
            committees_this_year: 1,
            committees_last_year: 0,
            is_mapped: true,
        };

        let csv = to_csv(&[row]);
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("email,display_name,"));
        let data = lines.next().unwrap();
        assert!(data.contains("\"Dr. \"\"Alice\"\", PhD\""));
        assert!(data.contains("\"{\"\"ENG\"\":3}\""));

        let stamp = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(
            csv_filename(Some(d(2024, 6, 1)), stamp),
            "personnel-performance_asOf-2024-06-01_20240601_120000.csv"
        );
        assert_eq!(
            csv_filename(None, stamp),
            "personnel-performance_current_20240601_120000.csv"
        );
    }
}
