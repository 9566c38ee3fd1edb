//! Committee outcome pipeline
//!
//! Turns a finalised proposal summary into career history: timeline events,
//! a compensation snapshot and a seniority snapshot, all inside the caller's
//! transaction. The pipeline is idempotent; it checks for an existing event
//! linked to the summary and backs out before writing anything.

use chrono::{NaiveDate, Utc};
use compass_common::models::{
    round_to_band, AspectChange, CompensationSnapshot, EventSource, EventType, ProposalType,
    SeniorityLevel, SenioritySnapshot, Stage, Summary, SummaryStatus, TimelineEvent, visibility,
};
use compass_common::Result;
use sqlx::SqliteConnection;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::db;

const TEXT_EVALUATION_DEFAULT: &str = "ارزیابی عملکرد ثبت شد.";
const TEXT_NOTICE: &str = "نوتیس عملکردی ثبت شد.";
const TEXT_MAPPING_FALLBACK: &str = "مپ به لدر - سطح: مشخص نشد.";

/// Render a number the way the committee texts expect: whole values lose
/// the trailing `.0`
fn fmt_num(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Stamps shared by every event one pipeline run emits
struct EventWriter {
    user_id: Uuid,
    effective_date: NaiveDate,
    source: EventSource,
    created_by: Option<Uuid>,
}

impl EventWriter {
    async fn emit(
        &self,
        conn: &mut SqliteConnection,
        event_type: EventType,
        summary_text: String,
    ) -> Result<()> {
        let event = TimelineEvent {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            event_type,
            summary_text,
            effective_date: self.effective_date,
            source: Some(self.source),
            visibility_mask: visibility::SELF,
            created_by: self.created_by,
            created_at: Utc::now(),
        };
        db::timeline::insert_event(conn, &event).await
    }
}

/// Aspect levels after folding a summary's changes into the latest snapshot
/// on the summary's ladder
struct MergedSeniority {
    previous: Option<SenioritySnapshot>,
    details: BTreeMap<String, i64>,
    stages: BTreeMap<String, Stage>,
    overall_before: f64,
    overall_after: f64,
}

/// Merge baseline: the last snapshot on this ladder, or every aspect of the
/// ladder at zero. Level entries with `changed` add their delta; stage
/// entries always overwrite.
async fn merge_with_latest(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    ladder_id: Uuid,
    changes: &BTreeMap<String, AspectChange>,
) -> Result<MergedSeniority> {
    let previous = db::snapshots::latest_seniority_for_ladder(&mut *conn, user_id, ladder_id).await?;

    let baseline: BTreeMap<String, i64> = match &previous {
        Some(snapshot) => snapshot.details.clone(),
        None => {
            let aspects = db::ladders::list_aspects(&mut *conn, ladder_id).await?;
            aspects.into_iter().map(|a| (a.code, 0)).collect()
        }
    };

    let mut details = baseline.clone();
    let mut stages = previous
        .as_ref()
        .map(|s| s.stages.clone())
        .unwrap_or_default();

    for (code, change) in changes {
        if change.changed {
            *details.entry(code.clone()).or_insert(0) += change.new_level;
        }
        if let Some(stage) = change.stage {
            stages.insert(code.clone(), stage);
        }
    }

    let overall_before = SenioritySnapshot::compute_overall(&baseline);
    let overall_after = SenioritySnapshot::compute_overall(&details);

    Ok(MergedSeniority {
        previous,
        details,
        stages,
        overall_before,
        overall_after,
    })
}

/// Multi-line change description: one line per changed aspect in the
/// ladder's display order, plus a trailing overall line when the mean moved
async fn seniority_text(
    conn: &mut SqliteConnection,
    ladder_id: Uuid,
    changes: &BTreeMap<String, AspectChange>,
    merged: &MergedSeniority,
) -> Result<String> {
    let aspects = db::ladders::list_aspects(conn, ladder_id).await?;

    let mut lines = Vec::new();
    for aspect in &aspects {
        let change = match changes.get(&aspect.code) {
            Some(change) if change.changed => change,
            _ => continue,
        };
        let new = merged.details.get(&aspect.code).copied().unwrap_or(0);
        let old = new - change.new_level;
        let delta = if change.new_level >= 0 {
            format!("(+{})", change.new_level)
        } else {
            format!("({})", change.new_level)
        };
        lines.push(format!(
            "{} ({}): از {} به {} {}",
            aspect.name, aspect.code, old, new, delta
        ));
    }

    if (merged.overall_after - merged.overall_before).abs() > f64::EPSILON {
        lines.push(format!(
            "سطح کلی: از {} به {}",
            fmt_num(merged.overall_before),
            fmt_num(merged.overall_after)
        ));
    }

    Ok(lines.join("\n"))
}

fn evaluation_text(summary: &Summary) -> String {
    summary
        .performance_label
        .clone()
        .unwrap_or_else(|| TEXT_EVALUATION_DEFAULT.to_string())
}

/// Run the pipeline for one summary.
///
/// No-op unless the summary is DONE, belongs to a proposal, and no timeline
/// event links back to it yet. `acting_user` is stamped as `created_by` on
/// every emitted event.
pub async fn run_for_summary(
    conn: &mut SqliteConnection,
    acting_user: Option<Uuid>,
    summary_id: Uuid,
) -> Result<()> {
    let summary = db::summaries::get_summary(&mut *conn, summary_id).await?;
    if summary.submit_status != SummaryStatus::Done {
        return Ok(());
    }

    let source = EventSource::Summary(summary.id);
    if db::timeline::exists_for_source(&mut *conn, &source).await? {
        tracing::debug!(summary_id = %summary.id, "Events already derived; skipping");
        return Ok(());
    }

    let note = db::notes::get_note(&mut *conn, summary.note_id).await?;
    let proposal_type = match note.proposal_type {
        Some(p) => p,
        // Goal self-assessments carry no committee outcome
        None => return Ok(()),
    };

    let effective_date = summary.effective_date();
    let writer = EventWriter {
        user_id: note.owner_id,
        effective_date,
        source,
        created_by: acting_user,
    };

    // Ladder change first, before any type-specific event
    if let Some(ladder_id) = summary.ladder_id {
        if let Some(previous) = db::snapshots::latest_seniority(&mut *conn, note.owner_id).await? {
            if previous.ladder_id != ladder_id {
                let old = db::ladders::get_ladder(&mut *conn, previous.ladder_id).await?;
                let new = db::ladders::get_ladder(&mut *conn, ladder_id).await?;
                writer
                    .emit(
                        &mut *conn,
                        EventType::LadderChanged,
                        format!("لدر کاربر از {} به {} تغییر کرد.", old.name, new.name),
                    )
                    .await?;
            }
        }
    }

    // The merged aspect state feeds both the event text and the snapshot, so
    // it is computed once before anything is inserted
    let merged = match summary.ladder_id {
        Some(ladder_id) if !summary.aspect_changes.is_empty() => Some(
            merge_with_latest(&mut *conn, note.owner_id, ladder_id, &summary.aspect_changes)
                .await?,
        ),
        _ => None,
    };

    match proposal_type {
        ProposalType::Promotion | ProposalType::Evaluation => {
            let mut emitted = false;

            if summary.salary_change > 0.0 {
                writer
                    .emit(
                        &mut *conn,
                        EventType::PayChange,
                        format!("افزایش پله‌ی حقوقی: {}", fmt_num(summary.salary_change)),
                    )
                    .await?;
                emitted = true;
            }

            if let (Some(ladder_id), Some(merged)) = (summary.ladder_id, &merged) {
                let text =
                    seniority_text(&mut *conn, ladder_id, &summary.aspect_changes, merged).await?;
                writer
                    .emit(&mut *conn, EventType::SeniorityChange, text)
                    .await?;
                emitted = true;
            }

            if summary.bonus > 0 {
                writer
                    .emit(
                        &mut *conn,
                        EventType::BonusPayout,
                        format!("پرداخت پاداش - {}٪ از حقوق", summary.bonus),
                    )
                    .await?;
                emitted = true;
            }

            if proposal_type == ProposalType::Evaluation {
                writer
                    .emit(&mut *conn, EventType::Evaluation, evaluation_text(&summary))
                    .await?;
            } else if !emitted {
                // A promotion that moved nothing still surfaces the outcome
                writer
                    .emit(&mut *conn, EventType::Evaluation, evaluation_text(&summary))
                    .await?;
            }
        }

        ProposalType::Notice => {
            writer
                .emit(&mut *conn, EventType::Notice, TEXT_NOTICE.to_string())
                .await?;
        }

        ProposalType::Mapping => {
            if summary.salary_change > 0.0 {
                writer
                    .emit(
                        &mut *conn,
                        EventType::PayChange,
                        format!("افزایش پله‌ی حقوقی: {}", fmt_num(summary.salary_change)),
                    )
                    .await?;
            }

            let text = match (summary.ladder_id, &merged) {
                (Some(ladder_id), Some(merged)) if !merged.details.is_empty() => {
                    let ladder = db::ladders::get_ladder(&mut *conn, ladder_id).await?;
                    format!(
                        "مپ به لدر {} - سطح: {}",
                        ladder.name,
                        fmt_num(merged.overall_after)
                    )
                }
                _ => TEXT_MAPPING_FALLBACK.to_string(),
            };
            writer.emit(&mut *conn, EventType::Mapping, text).await?;
        }
    }

    persist_snapshots(&mut *conn, &summary, note.owner_id, effective_date, merged).await?;

    tracing::info!(
        summary_id = %summary.id,
        user_id = %note.owner_id,
        proposal_type = proposal_type.as_str(),
        "Committee pipeline completed"
    );

    Ok(())
}

/// Step 3: history rows derived from the summary's numbers
async fn persist_snapshots(
    conn: &mut SqliteConnection,
    summary: &Summary,
    owner_id: Uuid,
    effective_date: NaiveDate,
    merged: Option<MergedSeniority>,
) -> Result<()> {
    if summary.salary_change != 0.0 {
        let change = round_to_band(summary.salary_change);
        let latest = db::snapshots::latest_compensation(&mut *conn, owner_id).await?;
        let old_number = latest.map(|s| s.pay_band_number).unwrap_or(0.0);
        let band =
            db::ladders::get_or_create_pay_band(&mut *conn, round_to_band(old_number + change))
                .await?;

        let snapshot = CompensationSnapshot {
            id: Uuid::new_v4(),
            user_id: owner_id,
            pay_band_id: band.id,
            pay_band_number: band.number,
            salary_change: change,
            bonus_percentage: summary.bonus,
            effective_date,
            source_summary_id: Some(summary.id),
            created_at: Utc::now(),
        };
        db::snapshots::insert_compensation(&mut *conn, &snapshot).await?;
    } else if summary.bonus > 0 {
        // Bonus without a band move still lands in pay history
        let latest = db::snapshots::latest_compensation(&mut *conn, owner_id).await?;
        let (band_id, band_number) = match latest {
            Some(snapshot) => (snapshot.pay_band_id, snapshot.pay_band_number),
            None => {
                let band = db::ladders::get_or_create_pay_band(&mut *conn, 0.0).await?;
                (band.id, band.number)
            }
        };

        let snapshot = CompensationSnapshot {
            id: Uuid::new_v4(),
            user_id: owner_id,
            pay_band_id: band_id,
            pay_band_number: band_number,
            salary_change: 0.0,
            bonus_percentage: summary.bonus,
            effective_date,
            source_summary_id: Some(summary.id),
            created_at: Utc::now(),
        };
        db::snapshots::insert_compensation(&mut *conn, &snapshot).await?;
    }

    if let (Some(ladder_id), Some(merged)) = (summary.ladder_id, merged) {
        let seniority_level = summary
            .ladder_change
            .as_deref()
            .and_then(|s| SeniorityLevel::parse(s).ok())
            .or_else(|| merged.previous.as_ref().and_then(|p| p.seniority_level));

        let snapshot = SenioritySnapshot {
            id: Uuid::new_v4(),
            user_id: owner_id,
            ladder_id,
            title: merged.previous.as_ref().and_then(|p| p.title.clone()),
            overall_score: merged.overall_after,
            details: merged.details,
            stages: merged.stages,
            seniority_level,
            effective_date,
            source_summary_id: Some(summary.id),
            created_at: Utc::now(),
        };
        db::snapshots::insert_seniority(&mut *conn, &snapshot).await?;
    }

    Ok(())
}
