// src/services/bulk.rs
//
// Partição das ações em massa: dado um lote de ids e a ação pedida, separa o
// que pode ser aplicado do que é pulado (com o motivo). Não toca no banco; os
// serviços carregam os snapshots e executam só a parte aplicável.

use std::collections::{BTreeMap, HashSet};

use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        rbac::RoleCandidate,
        view::{BulkActionKind, BulkRequest},
    },
};

pub mod reasons {
    pub const NOT_FOUND: &str = "No encontrado";
    pub const PROTECTED: &str = "Rol protegido";
    pub const ALREADY_ACTIVE: &str = "Ya está activo";
    pub const ALREADY_INACTIVE: &str = "Ya está inactivo";
    pub const HAS_USERS: &str = "Tiene usuarios asignados";
    pub const MUST_DEACTIVATE: &str = "Debe desactivarse antes de eliminarse";
    pub const HAS_PERMISSIONS: &str = "Tiene permisos asignados";
    pub const LAST_ADMIN: &str = "Debe existir al menos un rol administrador";
    pub const HAS_DEPENDENTS: &str = "Tiene registros dependientes";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Delete,
    SetActive(bool),
}

impl BulkAction {
    fn already_in_state(self, is_active: bool) -> Option<&'static str> {
        match self {
            BulkAction::SetActive(true) if is_active => Some(reasons::ALREADY_ACTIVE),
            BulkAction::SetActive(false) if !is_active => Some(reasons::ALREADY_INACTIVE),
            _ => None,
        }
    }

    /// Ações que podem deixar o sistema sem papel administrador.
    fn removes_admin(self) -> bool {
        matches!(self, BulkAction::Delete | BulkAction::SetActive(false))
    }
}

impl TryFrom<&BulkRequest> for BulkAction {
    type Error = AppError;

    fn try_from(request: &BulkRequest) -> Result<Self, Self::Error> {
        match request.action {
            BulkActionKind::Delete => Ok(BulkAction::Delete),
            BulkActionKind::Activate => Ok(BulkAction::SetActive(true)),
            BulkActionKind::Deactivate => Ok(BulkAction::SetActive(false)),
            BulkActionKind::SetActive => request
                .active
                .map(BulkAction::SetActive)
                .ok_or_else(|| AppError::field("active", "Indique si se debe activar o desactivar.")),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct BulkPartition {
    pub applicable: Vec<Uuid>,
    pub skipped: BTreeMap<Uuid, String>,
}

impl BulkPartition {
    fn skip(&mut self, id: Uuid, reason: &str) {
        self.skipped.insert(id, reason.to_string());
    }

    /// Versão de um registro só: o motivo vira erro de regra no campo `id`.
    /// "No encontrado" vira 404.
    pub fn into_single(self, id: Uuid) -> Result<(), AppError> {
        match self.skipped.get(&id) {
            None => Ok(()),
            Some(reason) if reason == reasons::NOT_FOUND => Err(AppError::NotFound),
            Some(reason) => Err(AppError::rule("id", reason.clone())),
        }
    }
}

/// Ids sem repetição, na ordem em que chegaram.
fn unique_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

// =============================================================================
//  CATÁLOGOS
// =============================================================================

#[derive(Debug, Clone)]
pub struct CatalogCandidate {
    pub id: Uuid,
    pub is_active: bool,
    pub dependents: i64,
}

pub fn partition_catalog(ids: &[Uuid], candidates: &[CatalogCandidate], action: BulkAction) -> BulkPartition {
    let by_id: BTreeMap<Uuid, &CatalogCandidate> = candidates.iter().map(|c| (c.id, c)).collect();
    let mut partition = BulkPartition::default();

    for id in unique_ids(ids) {
        let Some(row) = by_id.get(&id) else {
            partition.skip(id, reasons::NOT_FOUND);
            continue;
        };

        if let Some(reason) = action.already_in_state(row.is_active) {
            partition.skip(id, reason);
        } else if action == BulkAction::Delete && row.dependents > 0 {
            partition.skip(id, reasons::HAS_DEPENDENTS);
        } else {
            partition.applicable.push(id);
        }
    }

    partition
}

// =============================================================================
//  PAPÉIS
// =============================================================================

/// Contexto global da partição de papéis.
#[derive(Debug, Clone, Copy)]
pub struct RoleRules<'a> {
    pub action: BulkAction,
    pub force: bool,
    pub protected: &'a [String],
    /// Papéis administradores vivos (todos, ativos)
    pub admin_totals: (i64, i64),
}

pub fn is_protected(name: &str, protected: &[String]) -> bool {
    let name = name.trim();
    protected.iter().any(|p| p.trim().eq_ignore_ascii_case(name))
}

fn role_block(role: &RoleCandidate, rules: &RoleRules<'_>) -> Option<&'static str> {
    if is_protected(&role.name, rules.protected) {
        return Some(reasons::PROTECTED);
    }
    if let Some(reason) = rules.action.already_in_state(role.is_active) {
        return Some(reason);
    }
    if rules.action.removes_admin() && role.users_count > 0 {
        return Some(reasons::HAS_USERS);
    }
    if rules.action == BulkAction::Delete {
        if role.is_active {
            return Some(reasons::MUST_DEACTIVATE);
        }
        if role.permissions_count > 0 && !rules.force {
            return Some(reasons::HAS_PERMISSIONS);
        }
    }
    None
}

pub fn partition_roles(ids: &[Uuid], candidates: &[RoleCandidate], rules: RoleRules<'_>) -> BulkPartition {
    let by_id: BTreeMap<Uuid, &RoleCandidate> = candidates.iter().map(|c| (c.id, c)).collect();
    let mut partition = BulkPartition::default();

    for id in unique_ids(ids) {
        match by_id.get(&id) {
            None => partition.skip(id, reasons::NOT_FOUND),
            Some(role) => match role_block(role, &rules) {
                Some(reason) => partition.skip(id, reason),
                None => partition.applicable.push(id),
            },
        }
    }

    if rules.action.removes_admin() {
        protect_last_admin(&mut partition, &by_id, rules);
    }

    partition
}

// Se o lote levaria todos os administradores restantes, devolve o primeiro
// deles para os pulados.
fn protect_last_admin(partition: &mut BulkPartition, by_id: &BTreeMap<Uuid, &RoleCandidate>, rules: RoleRules<'_>) {
    let admins: Vec<Uuid> = partition
        .applicable
        .iter()
        .copied()
        .filter(|id| by_id.get(id).is_some_and(|r| r.is_admin))
        .collect();

    let Some(&keep) = admins.first() else {
        return;
    };

    let admin_total = match rules.action {
        BulkAction::Delete => rules.admin_totals.0,
        _ => rules.admin_totals.1,
    };

    if admin_total - admins.len() as i64 <= 0 {
        partition.applicable.retain(|id| *id != keep);
        partition.skip(keep, reasons::LAST_ADMIN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn role(name: &str, is_active: bool, users: i64, permissions: i64, is_admin: bool) -> RoleCandidate {
        RoleCandidate {
            id: Uuid::new_v4(),
            name: name.to_string(),
            is_active,
            users_count: users,
            permissions_count: permissions,
            is_admin,
        }
    }

    fn protected() -> Vec<String> {
        vec!["Administrador".to_string(), "Super Admin".to_string()]
    }

    fn rules(action: BulkAction, force: bool, protected: &[String], admin_totals: (i64, i64)) -> RoleRules<'_> {
        RoleRules { action, force, protected, admin_totals }
    }

    #[rstest]
    #[case(BulkAction::SetActive(true), true)]
    #[case(BulkAction::SetActive(false), false)]
    #[case(BulkAction::SetActive(false), true)]
    #[case(BulkAction::Delete, false)]
    fn protected_role_is_always_skipped(#[case] action: BulkAction, #[case] force: bool) {
        let names = protected();
        let admin = role(" administrador ", true, 3, 10, true);
        let partition = partition_roles(&[admin.id], &[admin.clone()], rules(action, force, &names, (5, 5)));

        assert!(partition.applicable.is_empty());
        assert_eq!(partition.skipped[&admin.id], reasons::PROTECTED);
    }

    #[test]
    fn role_rules_follow_precedence() {
        let names = protected();
        let active_with_users = role("Cajero", true, 2, 1, false);
        let active_idle = role("Auditor", true, 0, 1, false);
        let inactive_with_perms = role("Consulta", false, 0, 4, false);
        let inactive_empty = role("Viejo", false, 0, 0, false);
        let missing = Uuid::new_v4();

        let all = vec![
            active_with_users.clone(),
            active_idle.clone(),
            inactive_with_perms.clone(),
            inactive_empty.clone(),
        ];
        let ids = [active_with_users.id, active_idle.id, inactive_with_perms.id, inactive_empty.id, missing];

        let partition = partition_roles(&ids, &all, rules(BulkAction::Delete, false, &names, (1, 1)));

        assert_eq!(partition.applicable, vec![inactive_empty.id]);
        assert_eq!(partition.skipped[&active_with_users.id], reasons::HAS_USERS);
        assert_eq!(partition.skipped[&active_idle.id], reasons::MUST_DEACTIVATE);
        assert_eq!(partition.skipped[&inactive_with_perms.id], reasons::HAS_PERMISSIONS);
        assert_eq!(partition.skipped[&missing], reasons::NOT_FOUND);
    }

    // Usuários vinculados só bloqueiam o que tira acesso deles
    #[rstest]
    #[case(BulkAction::Delete, false, Some(reasons::HAS_USERS))]
    #[case(BulkAction::SetActive(false), true, Some(reasons::HAS_USERS))]
    #[case(BulkAction::SetActive(true), false, None)]
    fn users_block_only_removing_actions(
        #[case] action: BulkAction,
        #[case] is_active: bool,
        #[case] expected: Option<&str>,
    ) {
        let names = protected();
        let r = role("Cajero", is_active, 2, 0, false);
        let partition = partition_roles(&[r.id], &[r.clone()], rules(action, false, &names, (1, 1)));

        match expected {
            Some(reason) => assert_eq!(partition.skipped[&r.id], reason),
            None => {
                assert_eq!(partition.applicable, vec![r.id]);
                assert!(partition.skipped.is_empty());
            }
        }
    }

    #[test]
    fn force_allows_deleting_roles_with_permissions() {
        let names = protected();
        let r = role("Consulta", false, 0, 4, false);
        let partition = partition_roles(&[r.id], &[r.clone()], rules(BulkAction::Delete, true, &names, (1, 1)));
        assert_eq!(partition.applicable, vec![r.id]);
    }

    #[test]
    fn bulk_delete_keeps_the_last_admin_role() {
        let names = protected();
        let first = role("Jefe A", false, 0, 4, true);
        let second = role("Jefe B", false, 0, 4, true);
        let ids = [first.id, second.id];

        let partition = partition_roles(
            &ids,
            &[first.clone(), second.clone()],
            rules(BulkAction::Delete, true, &names, (2, 0)),
        );

        assert_eq!(partition.applicable, vec![second.id]);
        assert_eq!(partition.skipped.len(), 1);
        assert_eq!(partition.skipped[&first.id], reasons::LAST_ADMIN);
    }

    #[test]
    fn deactivation_counts_only_active_admins() {
        let names = protected();
        let admin = role("Jefe", true, 0, 4, true);

        // Outro administrador ativo sobrevive: pode desativar
        let ok = partition_roles(&[admin.id], &[admin.clone()], rules(BulkAction::SetActive(false), false, &names, (3, 2)));
        assert_eq!(ok.applicable, vec![admin.id]);

        // É o único ativo: bloqueado
        let blocked = partition_roles(&[admin.id], &[admin.clone()], rules(BulkAction::SetActive(false), false, &names, (3, 1)));
        assert_eq!(blocked.skipped[&admin.id], reasons::LAST_ADMIN);
    }

    #[test]
    fn activation_ignores_users_and_admin_count() {
        let names = protected();
        let r = role("Cajero", false, 5, 1, true);
        let partition = partition_roles(&[r.id], &[r.clone()], rules(BulkAction::SetActive(true), false, &names, (0, 0)));
        assert_eq!(partition.applicable, vec![r.id]);
    }

    #[test]
    fn catalog_rules_and_duplicates() {
        let active = CatalogCandidate { id: Uuid::new_v4(), is_active: true, dependents: 0 };
        let used = CatalogCandidate { id: Uuid::new_v4(), is_active: false, dependents: 3 };
        let candidates = vec![active.clone(), used.clone()];

        let activate = partition_catalog(&[active.id, used.id, active.id], &candidates, BulkAction::SetActive(true));
        assert_eq!(activate.applicable, vec![used.id]);
        assert_eq!(activate.skipped[&active.id], reasons::ALREADY_ACTIVE);

        let delete = partition_catalog(&[active.id, used.id], &candidates, BulkAction::Delete);
        assert_eq!(delete.applicable, vec![active.id]);
        assert_eq!(delete.skipped[&used.id], reasons::HAS_DEPENDENTS);

        // Desativar com dependentes é permitido
        let deactivate = partition_catalog(&[used.id, active.id], &candidates, BulkAction::SetActive(false));
        assert_eq!(deactivate.applicable, vec![active.id]);
        assert_eq!(deactivate.skipped[&used.id], reasons::ALREADY_INACTIVE);
    }

    #[test]
    fn set_active_requires_the_flag() {
        let request = BulkRequest { action: BulkActionKind::SetActive, ids: vec![Uuid::new_v4()], active: None, force: false };
        assert!(matches!(BulkAction::try_from(&request), Err(AppError::ValidationError(_))));

        let request = BulkRequest { active: Some(false), ..request };
        assert_eq!(BulkAction::try_from(&request).unwrap(), BulkAction::SetActive(false));
    }

    #[test]
    fn single_variant_maps_reasons_to_errors() {
        let id = Uuid::new_v4();

        let missing = BulkPartition { applicable: vec![], skipped: BTreeMap::from([(id, reasons::NOT_FOUND.to_string())]) };
        assert!(matches!(missing.into_single(id), Err(AppError::NotFound)));

        let blocked = BulkPartition { applicable: vec![], skipped: BTreeMap::from([(id, reasons::HAS_DEPENDENTS.to_string())]) };
        match blocked.into_single(id) {
            Err(AppError::DomainRule { field, message }) => {
                assert_eq!(field, "id");
                assert_eq!(message, reasons::HAS_DEPENDENTS);
            }
            other => panic!("esperava regra de domínio, veio {:?}", other),
        }

        let fine = BulkPartition { applicable: vec![id], skipped: BTreeMap::new() };
        assert!(fine.into_single(id).is_ok());
    }
}
