//! Multi-source evidence pipeline for one match.
//!
//! Per domain: cache check, fetch from every registered source, quality
//! gates, consensus merge, typed parse, and a cache write for passing
//! consensus. Source failures are logged and skipped; the pipeline never
//! aborts a match because one source failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::canonical::iso_utc;
use crate::engine::consensus::build_consensus;
use crate::engine::evidence::{Domain, DomainData, DomainPayload, EvidencePack, QualityReport};
use crate::engine::quality::{assess_quality, required_fields_for_domain, NormalizedPayload};
use crate::models::FetchLogRow;
use crate::pipeline::cache::{cache_payload, get_cached_payload};
use crate::pipeline::sources::{pin_fetched_at, sources_for_domain};
use crate::storage::{Repository, StorageError};

/// Pipeline input for one match.
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub match_id: String,
    pub domains: Vec<Domain>,
    pub window_hours: u32,
    pub force_refresh: bool,
}

impl PipelineInput {
    pub fn new(match_id: impl Into<String>) -> Self {
        Self {
            match_id: match_id.into(),
            domains: vec![Domain::Fixtures, Domain::Stats],
            window_hours: 72,
            force_refresh: false,
        }
    }
}

/// Overall pipeline status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Ok,
    Partial,
    NoData,
}

/// Pipeline output.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub status: PipelineStatus,
    pub evidence_pack: Option<EvidencePack>,
    pub notes: Vec<String>,
}

/// Run the multi-source pipeline for one match.
pub async fn run_pipeline(
    repo: &dyn Repository,
    input: &PipelineInput,
    now_utc: DateTime<Utc>,
    dry_run: bool,
) -> Result<PipelineResult, StorageError> {
    let mut notes: Vec<String> = Vec::new();
    let mut pack = EvidencePack::new(input.match_id.clone(), iso_utc(now_utc));
    let mut all_domains_ok = true;
    let mut any_domain_ok = false;

    for domain in &input.domains {
        let domain_name = domain.as_str();

        if input.force_refresh {
            notes.push(format!("CACHE_BYPASS_FORCE_REFRESH:{domain_name}"));
        } else if let Some(cached) =
            get_cached_payload(repo, &input.match_id, domain_name, input.window_hours)?
        {
            // Cache hit bypasses fetching entirely.
            notes.push(format!("CACHE_HIT:{domain_name}"));
            if let Some(domain_data) = domain_data_from_cached(*domain, &cached) {
                let passed = domain_data.quality.passed;
                pack.domains.insert(*domain, domain_data);
                if passed {
                    any_domain_ok = true;
                } else {
                    all_domains_ok = false;
                }
                continue;
            }
            notes.push(format!("CACHE_INVALID:{domain_name}"));
        }

        let sources = sources_for_domain(domain_name);
        if sources.is_empty() {
            notes.push(format!("NO_SOURCES_AVAILABLE:{domain_name}"));
            all_domains_ok = false;
            continue;
        }

        let mut payloads: Vec<NormalizedPayload> = Vec::new();
        for source in &sources {
            let started = std::time::Instant::now();
            match source.fetch(&input.match_id, input.window_hours).await {
                Ok(mut payload) => {
                    pin_fetched_at(&mut payload, now_utc);
                    let latency_ms = started.elapsed().as_millis() as i64;
                    payloads.push(NormalizedPayload {
                        source_name: source.source_name().to_string(),
                        domain: domain_name.to_string(),
                        data: payload.data,
                        fetched_at_utc: payload.fetched_at_utc,
                        source_confidence: payload.source_confidence,
                    });
                    if !dry_run {
                        repo.add_fetch_log(&FetchLogRow {
                            id: 0,
                            source_name: source.source_name().to_string(),
                            domain: domain_name.to_string(),
                            status: "success".to_string(),
                            latency_ms,
                            notes: None,
                            created_at_utc: now_utc,
                        })?;
                    }
                }
                Err(e) => {
                    warn!(
                        source = source.source_name(),
                        domain = domain_name,
                        error = %e,
                        "source fetch failed; continuing with remaining sources"
                    );
                    if !dry_run {
                        repo.add_fetch_log(&FetchLogRow {
                            id: 0,
                            source_name: source.source_name().to_string(),
                            domain: domain_name.to_string(),
                            status: "error".to_string(),
                            latency_ms: 0,
                            notes: Some(e.to_string()),
                            created_at_utc: now_utc,
                        })?;
                    }
                }
            }
        }

        if payloads.is_empty() {
            notes.push(format!("NO_DATA_FETCHED:{domain_name}"));
            all_domains_ok = false;
            continue;
        }

        let quality = assess_quality(
            &payloads,
            input.window_hours,
            required_fields_for_domain(domain_name),
            now_utc,
        );
        if !quality.passed {
            notes.push(format!("QUALITY_GATE_FAILED:{domain_name}"));
            all_domains_ok = false;
        }

        let consensus = build_consensus(&payloads, quality, domain_name);
        let Some(typed) = DomainPayload::parse(*domain, &consensus.data) else {
            // Free-form maps are rejected at this boundary.
            notes.push(format!("CONSENSUS_UNPARSEABLE:{domain_name}"));
            all_domains_ok = false;
            continue;
        };

        let quality_passed = consensus.quality.passed;
        if quality_passed {
            any_domain_ok = true;
        }

        // Cache only passing consensus, and never under persistence blocks.
        if quality_passed && !input.force_refresh && !dry_run {
            let consensus_payload = serde_json::json!({
                "source_name": "consensus",
                "domain": domain_name,
                "data": consensus.data,
                "fetched_at_utc": iso_utc(now_utc),
                "source_confidence": 1.0,
            });
            cache_payload(
                repo,
                &input.match_id,
                domain_name,
                input.window_hours,
                &consensus_payload,
                now_utc,
            )?;
        }

        pack.domains.insert(
            *domain,
            DomainData {
                data: typed,
                quality: consensus.quality,
                sources: consensus.sources,
            },
        );
    }

    for domain_data in pack.domains.values() {
        for flag in &domain_data.quality.flags {
            if !pack.flags.contains(flag) {
                pack.flags.push(flag.clone());
            }
        }
    }

    let status = if all_domains_ok {
        PipelineStatus::Ok
    } else if any_domain_ok {
        PipelineStatus::Partial
    } else {
        PipelineStatus::NoData
    };
    debug!(match_id = %input.match_id, ?status, "multi-source pipeline complete");

    Ok(PipelineResult {
        status,
        evidence_pack: Some(pack),
        notes,
    })
}

/// Rebuild a DomainData from a cached consensus payload.
fn domain_data_from_cached(domain: Domain, cached: &serde_json::Value) -> Option<DomainData> {
    let data = cached.get("data")?;
    let typed = DomainPayload::parse(domain, data)?;
    Some(DomainData {
        data: typed,
        quality: QualityReport {
            passed: true,
            score: 1.0,
            flags: vec![],
        },
        sources: vec!["consensus".to_string()],
    })
}
