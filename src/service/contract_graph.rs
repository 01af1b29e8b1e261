// service/contract_graph.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bigdecimal::BigDecimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::SettlementStore,
    models::{contractmodel::*, escrowmodel::Escrow},
    service::{
        commission_service::{CommissionPolicyResolver, CommissionSource, ResolvedCommission},
        error::ServiceError,
    },
    utils::{
        currency::{percent_of, BPS_SCALE},
        decimal::{bps_to_percent, PercentHelpers},
    },
};

/// Parent chains deeper than this are treated as corrupt.
const MAX_CHAIN_DEPTH: usize = 64;

/// Validates a re-share against the links already committed and returns the
/// split amount for the new sub-contract. Runs inside the store's locked
/// section, so the sums it reads are stable.
pub fn plan_split(
    parent: &Contract,
    reshared_job: &Job,
    job_links: &[SubContractLink],
    parent_links: &[SubContractLink],
    split_percentage: &BigDecimal,
    split_bps: i64,
) -> Result<i64, ServiceError> {
    if parent.status != ContractStatus::Active {
        return Err(ServiceError::ContractNotActive { contract_id: parent.id });
    }

    if reshared_job.parent_job_id != Some(parent.job_id) {
        return Err(ServiceError::Validation(format!(
            "Job {} is not a re-share of job {}",
            reshared_job.id, parent.job_id
        )));
    }

    if let Some(other) = job_links.iter().find(|l| l.parent_contract_id != parent.id) {
        return Err(ServiceError::Validation(format!(
            "Job {} is already re-shared under contract {}",
            reshared_job.id, other.parent_contract_id
        )));
    }

    let mut allocated_bps = 0i64;
    for link in job_links {
        let bps = link.split_percentage.to_basis_points().ok_or_else(|| {
            ServiceError::DataIntegrity(format!(
                "sub-contract {} has unrepresentable split {}",
                link.id, link.split_percentage
            ))
        })?;
        allocated_bps += bps;
    }

    if allocated_bps > BPS_SCALE {
        return Err(ServiceError::DataIntegrity(format!(
            "splits on job {} already total {}%",
            reshared_job.id,
            bps_to_percent(allocated_bps)
        )));
    }

    if allocated_bps + split_bps > BPS_SCALE {
        return Err(ServiceError::SplitExceeded {
            reshared_job_id: reshared_job.id,
            allocated: bps_to_percent(allocated_bps),
            requested: split_percentage.clone(),
        });
    }

    let allocated_amount: i64 = parent_links.iter().map(|l| l.split_amount).sum();
    let remaining = parent.gross_amount - allocated_amount;
    if remaining < 0 {
        return Err(ServiceError::DataIntegrity(format!(
            "contract {} has {} allocated to sub-contracts but is only worth {}",
            parent.id, allocated_amount, parent.gross_amount
        )));
    }

    // Banker's rounding can push the last split one minor unit past what is
    // left; the parent never goes negative.
    Ok(percent_of(parent.gross_amount, split_bps).min(remaining))
}

/// A tree accepts re-shares until settlement starts: no payout rows exist and,
/// if it was ever funded, one of its escrows is still pending or held.
pub fn check_tree_open(
    root_contract_id: Uuid,
    escrows: &[Escrow],
    payout_count: usize,
) -> Result<(), ServiceError> {
    if payout_count > 0 {
        return Err(ServiceError::SettlementStarted {
            root_contract_id,
            reason: format!("{} payouts already prepared", payout_count),
        });
    }

    if !escrows.is_empty() && !escrows.iter().any(|e| e.status.is_active()) {
        return Err(ServiceError::SettlementStarted {
            root_contract_id,
            reason: "its escrow is already settled".to_string(),
        });
    }

    Ok(())
}

/// The override that applies to a node: the link's own commission first, then
/// the child contract's.
pub fn node_override(link: Option<&SubContractLink>, contract: &Contract) -> Option<CommissionOverride> {
    link.map(|l| l.commission_override())
        .filter(|o| o.is_set())
        .or_else(|| Some(contract.commission_override()).filter(|o| o.is_set()))
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractNode {
    pub contract: Contract,
    pub link: Option<SubContractLink>,
    pub gross_amount: i64,
    pub allocated_to_children: i64,
    pub retained_amount: i64,
    pub commission: ResolvedCommission,
    pub commission_amount: i64,
    pub net_amount: i64,
    pub children: Vec<ContractNode>,
}

impl ContractNode {
    /// Pre-order walk of the tree.
    pub fn nodes(&self) -> Vec<&ContractNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.nodes());
        }
        out
    }

    pub fn contract_ids(&self) -> Vec<Uuid> {
        self.nodes().iter().map(|n| n.contract.id).collect()
    }

    pub fn link_ids(&self) -> Vec<Uuid> {
        self.nodes().iter().filter_map(|n| n.link.as_ref().map(|l| l.id)).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ContractGraph {
    db_client: Arc<dyn SettlementStore>,
    commission_resolver: CommissionPolicyResolver,
}

impl ContractGraph {
    pub fn new(db_client: Arc<dyn SettlementStore>) -> Self {
        let commission_resolver = CommissionPolicyResolver::new(db_client.clone());
        Self {
            db_client,
            commission_resolver,
        }
    }

    pub async fn create_sub_contract(
        &self,
        parent_contract_id: Uuid,
        reshared_job_id: Uuid,
        split_percentage: BigDecimal,
        recipient_user_id: Uuid,
        commission: CommissionOverride,
    ) -> Result<SubContractLink, ServiceError> {
        let split_bps = split_percentage
            .to_basis_points()
            .filter(|bps| *bps > 0 && *bps <= BPS_SCALE)
            .ok_or_else(|| {
                ServiceError::Validation(format!(
                    "Split percentage must be greater than 0 and at most 100 with two decimals, got {}",
                    split_percentage
                ))
            })?;

        if let Some(commission_type) = commission.commission_type {
            ResolvedCommission::from_fields(
                commission_type,
                commission.percent.as_ref(),
                commission.amount,
                CommissionSource::ContractOverride,
            )?;
        }

        let parent = self
            .db_client
            .get_contract(parent_contract_id)
            .await?
            .ok_or(ServiceError::ContractNotFound(parent_contract_id))?;

        if parent.hired_user_id == recipient_user_id {
            return Err(ServiceError::Validation(
                "A contract cannot be re-shared to its own holder".to_string(),
            ));
        }

        let root = self.root_of(parent.id).await?;

        let (link, child) = self
            .db_client
            .create_sub_contract(NewSubContract {
                root_contract_id: root.id,
                parent_contract: parent,
                reshared_job_id,
                split_percentage,
                split_bps,
                recipient_user_id,
                commission,
            })
            .await?;

        tracing::info!(
            root_contract_id = %link.root_contract_id,
            parent_contract_id = %link.parent_contract_id,
            sub_contract_id = %child.id,
            split_amount = link.split_amount,
            "Sub-contract created with {}% split",
            link.split_percentage
        );

        Ok(link)
    }

    /// Walks parent pointers to the top of the chain. A revisited contract
    /// means the chain is cyclic.
    pub async fn root_of(&self, contract_id: Uuid) -> Result<Contract, ServiceError> {
        let mut current = self
            .db_client
            .get_contract(contract_id)
            .await?
            .ok_or(ServiceError::ContractNotFound(contract_id))?;

        let mut visited = HashSet::from([current.id]);

        while let Some(parent_id) = current.parent_contract_id {
            if !visited.insert(parent_id) || visited.len() > MAX_CHAIN_DEPTH {
                tracing::error!(contract_id = %contract_id, "Cycle detected in contract parent chain");
                return Err(ServiceError::DataIntegrity(format!(
                    "contract parent chain starting at {} is cyclic",
                    contract_id
                )));
            }

            current = self.db_client.get_contract(parent_id).await?.ok_or_else(|| {
                ServiceError::DataIntegrity(format!("contract {} points at missing parent {}", current.id, parent_id))
            })?;
        }

        Ok(current)
    }

    pub async fn resolve_tree(&self, root_contract_id: Uuid) -> Result<ContractNode, ServiceError> {
        let root = self
            .db_client
            .get_contract(root_contract_id)
            .await?
            .ok_or(ServiceError::ContractNotFound(root_contract_id))?;

        if root.parent_contract_id.is_some() {
            return Err(ServiceError::Validation(format!(
                "Contract {} is a sub-contract; resolve its root instead",
                root.id
            )));
        }

        let links = self.db_client.get_sub_contract_links_by_root(root.id).await?;
        let child_ids: Vec<Uuid> = links.iter().map(|l| l.sub_contract_id).collect();
        let contracts: HashMap<Uuid, Contract> = self
            .db_client
            .get_contracts(&child_ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut links_by_parent: HashMap<Uuid, Vec<&SubContractLink>> = HashMap::new();
        for link in &links {
            links_by_parent.entry(link.parent_contract_id).or_default().push(link);
        }

        // Breadth-first flattening; each entry remembers its parent's index.
        let mut flat: Vec<(Contract, Option<SubContractLink>, Option<usize>)> = vec![(root.clone(), None, None)];
        let mut visited = HashSet::from([root.id]);
        let mut cursor = 0;
        while cursor < flat.len() {
            let parent_id = flat[cursor].0.id;
            for link in links_by_parent.get(&parent_id).into_iter().flatten() {
                if !visited.insert(link.sub_contract_id) {
                    return Err(ServiceError::DataIntegrity(format!(
                        "sub-contract {} appears twice under root {}",
                        link.sub_contract_id, root.id
                    )));
                }
                let contract = contracts.get(&link.sub_contract_id).cloned().ok_or_else(|| {
                    ServiceError::DataIntegrity(format!("link {} points at missing contract {}", link.id, link.sub_contract_id))
                })?;
                flat.push((contract, Some((*link).clone()), Some(cursor)));
            }
            cursor += 1;
        }

        if visited.len() != links.len() + 1 {
            return Err(ServiceError::DataIntegrity(format!(
                "sub-contract links under root {} do not form a single tree",
                root.id
            )));
        }

        let mut nodes: Vec<Option<ContractNode>> = Vec::with_capacity(flat.len());
        for (contract, link, _) in &flat {
            let gross_amount = link.as_ref().map(|l| l.split_amount).unwrap_or(contract.gross_amount);
            let allocated_to_children: i64 = links_by_parent
                .get(&contract.id)
                .map(|children| children.iter().map(|l| l.split_amount).sum())
                .unwrap_or(0);
            let retained_amount = gross_amount - allocated_to_children;
            if retained_amount < 0 {
                return Err(ServiceError::DataIntegrity(format!(
                    "contract {} allocated {} to sub-contracts out of {}",
                    contract.id, allocated_to_children, gross_amount
                )));
            }

            let commission = self.node_commission(link.as_ref(), contract).await?;
            let commission_amount = if retained_amount == 0 {
                0
            } else {
                commission.commission_on(retained_amount)
            };

            nodes.push(Some(ContractNode {
                contract: contract.clone(),
                link: link.clone(),
                gross_amount,
                allocated_to_children,
                retained_amount,
                commission,
                commission_amount,
                net_amount: retained_amount - commission_amount,
                children: Vec::new(),
            }));
        }

        // Children sit after their parent in breadth-first order, so folding
        // from the back attaches every subtree before its parent moves.
        for index in (1..flat.len()).rev() {
            let parent_index = flat[index].2.ok_or_else(|| {
                ServiceError::DataIntegrity(format!("sub-contract {} lost its parent", flat[index].0.id))
            })?;
            let node = nodes[index]
                .take()
                .ok_or_else(|| ServiceError::Other("tree node consumed twice".to_string()))?;
            if let Some(parent) = nodes[parent_index].as_mut() {
                parent.children.insert(0, node);
            }
        }

        nodes
            .into_iter()
            .next()
            .flatten()
            .ok_or_else(|| ServiceError::Other("tree root missing after assembly".to_string()))
    }

    async fn node_commission(
        &self,
        link: Option<&SubContractLink>,
        contract: &Contract,
    ) -> Result<ResolvedCommission, ServiceError> {
        if let Some(commission) = node_override(link, contract) {
            // Role and billing cycle are irrelevant when an override applies.
            return self
                .commission_resolver
                .resolve(Uuid::nil(), contract.billing_cycle, Some(&commission))
                .await;
        }

        let role_id = self
            .db_client
            .get_user_role(contract.hired_user_id)
            .await?
            .ok_or(ServiceError::UserRoleNotFound(contract.hired_user_id))?;

        self.commission_resolver
            .resolve(role_id, contract.billing_cycle, None)
            .await
    }
}
