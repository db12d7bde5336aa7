use std::{ fmt, path::PathBuf };

use anyhow::Result;
use tracing::{ info, warn, debug };

use crate::{
    error::ReconcileError,
    iplist::{ self, Selection },
    sc::{ self, ScApi, AGENT_FORMAT, IPV4_FORMAT, STATIC_LIST_TYPE },
    template,
};

pub const DEFAULT_LIMIT: usize = 500;
const SCAN_FILE_NAME: &str = "dedup_ips.nessus";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Repository(String),
    None,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub source: Source,
    pub target_repository: Option<String>,
    pub limit: usize,
    pub asset_list: Option<String>,
    pub template: PathBuf,
    pub dry_run: bool,
}

impl Default for Plan {
    fn default() -> Self {
        Plan {
            source: Source::None,
            target_repository: None,
            limit: DEFAULT_LIMIT,
            asset_list: None,
            template: PathBuf::from("template.nessus"),
            dry_run: false,
        }
    }
}

impl Plan {
    fn needs_ips(&self) -> bool {
        self.target_repository.is_some() || self.asset_list.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub target: String,
    pub target_ips: usize,
    pub selection: Selection,
    pub limit: usize,
    pub uploaded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetListAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetListOutcome {
    pub name: String,
    pub action: AssetListAction,
    pub ips: usize,
    pub applied: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub dry_run: bool,
    pub source_ips: usize,
    pub deletion: Option<Deletion>,
    pub asset_list: Option<AssetListOutcome>,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.dry_run {
            writeln!(f, "dry run, no changes were made")?;
        }
        writeln!(f, "source ips: {}", self.source_ips)?;
        if let Some(d) = &self.deletion {
            writeln!(f, "target {}: {} ips", d.target, d.target_ips)?;
            writeln!(f, "matching ips: {}", d.selection.matched)?;
            write!(f, "selected for deletion: {}", d.selection.selected.len())?;
            if d.selection.truncated {
                write!(f, " (truncated to limit {})", d.limit)?;
            }
            writeln!(f)?;
            let state = if d.uploaded {
                "uploaded"
            } else if d.selection.selected.is_empty() {
                "nothing to delete"
            } else {
                "not uploaded"
            };
            writeln!(f, "deletion: {}", state)?;
        }
        if let Some(a) = &self.asset_list {
            let verb = match (a.action, a.applied) {
                (AssetListAction::Created, true) => "created",
                (AssetListAction::Updated, true) => "updated",
                (AssetListAction::Created, false) => "would be created",
                (AssetListAction::Updated, false) => "would be updated",
            };
            writeln!(f, "asset list {}: {} with {} ips", a.name, verb, a.ips)?;
        }
        Ok(())
    }
}

async fn resolve_source(
    api: &dyn ScApi,
    catalog: &[sc::Repository],
    source: &Source
) -> Result<Vec<String>> {
    match source {
        Source::File(path) => {
            let ips = iplist::read_ip_file(path)?;
            info!("read {} ips from {:?}", ips.len(), path);
            Ok(ips)
        }
        Source::Repository(name) => {
            let repo = sc::find_repository(catalog, name, AGENT_FORMAT)?;
            info!("source: [{}] {}", repo.id, repo.name);
            let ips = api.repository_ips(&repo.id).await?;
            info!("identified {} ips in {}", ips.len(), repo.name);
            Ok(ips)
        }
        Source::None => Ok(vec![]),
    }
}

async fn delete_from_target(
    api: &dyn ScApi,
    target: &sc::Repository,
    ips: &[String],
    plan: &Plan
) -> Result<Deletion> {
    let target_ips = api.repository_ips(&target.id).await?;
    let selection = iplist::select(ips, &target_ips, plan.limit);
    info!(
        "{} of {} source ips exist in {} ({} ips)",
        selection.matched,
        ips.len(),
        target.name,
        target_ips.len()
    );
    if selection.truncated {
        warn!(
            "{} matching ips exceed the limit of {}, only the first {} will be deleted",
            selection.matched,
            plan.limit,
            selection.selected.len()
        );
    }

    let mut uploaded = false;
    if selection.selected.is_empty() {
        info!("no matching ips in {}, nothing to delete", target.name);
    } else {
        // rendered in dry runs too, a broken template must fail them
        let content = template::load_and_render(&plan.template, &selection.selected)?;
        if plan.dry_run {
            info!(
                "dry run, skipping deletion of {} ips from {}",
                selection.selected.len(),
                target.name
            );
        } else {
            api.import_scan(&target.id, SCAN_FILE_NAME, content).await?;
            info!("uploaded deletion of {} ips to {}", selection.selected.len(), target.name);
            uploaded = true;
        }
    }

    Ok(Deletion {
        target: target.name.clone(),
        target_ips: target_ips.len(),
        selection,
        limit: plan.limit,
        uploaded,
    })
}

async fn upsert_asset_list(
    api: &dyn ScApi,
    name: &str,
    ips: &[String],
    dry_run: bool
) -> Result<AssetListOutcome> {
    let lists = api.manageable_asset_lists().await?;
    let existing = lists
        .iter()
        .find(|l| l.name == name && l.list_type == STATIC_LIST_TYPE);
    if existing.is_none() {
        // only static lists carry definedIPs, never touch or shadow another type
        if let Some(other) = lists.iter().find(|l| l.name == name) {
            return Err(
                ReconcileError::BadInput(
                    format!("asset list {} is a {} list, not static", name, other.list_type)
                ).into()
            );
        }
    }
    let action = if existing.is_some() {
        AssetListAction::Updated
    } else {
        AssetListAction::Created
    };

    if dry_run {
        info!("dry run, skipping asset list {} ({} ips)", name, ips.len());
    } else if let Some(l) = existing {
        debug!("replacing contents of {} asset list [{}] {}", l.list_type, l.id, l.name);
        api.update_asset_list(&l.id, ips).await?;
        info!("updated asset list {} with {} ips", name, ips.len());
    } else {
        api.create_asset_list(name, ips).await?;
        info!("created asset list {} with {} ips", name, ips.len());
    }

    Ok(AssetListOutcome {
        name: name.to_string(),
        action,
        ips: ips.len(),
        applied: !dry_run,
    })
}

pub async fn run(api: &dyn ScApi, plan: &Plan) -> Result<Summary> {
    if plan.source == Source::None && plan.needs_ips() {
        return Err(
            ReconcileError::BadInput(
                "an input file or input repository is required".to_string()
            ).into()
        );
    }

    let catalog = api.list_repositories().await?;
    debug!("loaded {} repositories", catalog.len());

    // validate both repositories before reading any findings
    if let Source::Repository(name) = &plan.source {
        sc::find_repository(&catalog, name, AGENT_FORMAT)?;
    }
    let target = match &plan.target_repository {
        Some(name) => {
            let t = sc::find_repository(&catalog, name, IPV4_FORMAT)?;
            info!("target: [{}] {}", t.id, t.name);
            Some(t)
        }
        None => None,
    };

    let ips = iplist::dedup(&resolve_source(api, &catalog, &plan.source).await?);
    if ips.is_empty() && plan.needs_ips() {
        return Err(ReconcileError::BadInput("no ip addresses found in input".to_string()).into());
    }

    let mut summary = Summary {
        dry_run: plan.dry_run,
        source_ips: ips.len(),
        ..Default::default()
    };
    if let Some(t) = target {
        summary.deletion = Some(delete_from_target(api, t, &ips, plan).await?);
    }
    if let Some(name) = &plan.asset_list {
        summary.asset_list = Some(upsert_asset_list(api, name, &ips, plan.dry_run).await?);
    }
    Ok(summary)
}
