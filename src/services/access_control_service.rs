//! 访问控制服务
//!
//! 三层授权：角色层级、静态权限矩阵、资源所有权 + 授权关系。
//! 所有守卫返回同一个判定类型（Allowed | Denied{reason}），
//! 矩阵在启动时做完整性校验，缺失条目阻止进程启动而不是在运行时静默拒绝。

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    models::consent::{ConsentCapability, ConsentRelationship},
    models::user::Role,
    repository::consent_repo::ConsentRepository,
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

/// 受保护资源类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Biomarker,
    Insurance,
    Dna,
    HealthNeed,
    User,
    Consent,
    AuditLog,
}

impl ResourceType {
    pub const ALL: [ResourceType; 7] = [
        ResourceType::Biomarker,
        ResourceType::Insurance,
        ResourceType::Dna,
        ResourceType::HealthNeed,
        ResourceType::User,
        ResourceType::Consent,
        ResourceType::AuditLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Biomarker => "biomarker",
            ResourceType::Insurance => "insurance",
            ResourceType::Dna => "dna",
            ResourceType::HealthNeed => "health_need",
            ResourceType::User => "user",
            ResourceType::Consent => "consent",
            ResourceType::AuditLog => "audit_log",
        }
    }
}

/// 操作权限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessPermission {
    Read,
    Write,
    Delete,
    Admin,
}

impl AccessPermission {
    pub const ALL: [AccessPermission; 4] = [
        AccessPermission::Read,
        AccessPermission::Write,
        AccessPermission::Delete,
        AccessPermission::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessPermission::Read => "read",
            AccessPermission::Write => "write",
            AccessPermission::Delete => "delete",
            AccessPermission::Admin => "admin",
        }
    }
}

const ALL_ROLES: [Role; 3] = [Role::Patient, Role::Provider, Role::Admin];

/// 静态权限矩阵：每个 (角色, 资源) 对都必须有显式条目，空条目表示无任何权限。
/// 表的完整性由 `validate_permission_matrix` 在启动时校验。
#[rustfmt::skip]
const PERMISSION_TABLE: &[(Role, ResourceType, &[AccessPermission])] = &[
    // 患者：自己的数据可读写删，不碰审计日志
    (Role::Patient, ResourceType::Biomarker,  &[AccessPermission::Read, AccessPermission::Write, AccessPermission::Delete]),
    (Role::Patient, ResourceType::Insurance,  &[AccessPermission::Read, AccessPermission::Write, AccessPermission::Delete]),
    (Role::Patient, ResourceType::Dna,        &[AccessPermission::Read, AccessPermission::Write, AccessPermission::Delete]),
    (Role::Patient, ResourceType::HealthNeed, &[AccessPermission::Read, AccessPermission::Write, AccessPermission::Delete]),
    (Role::Patient, ResourceType::User,       &[AccessPermission::Read, AccessPermission::Write]),
    (Role::Patient, ResourceType::Consent,    &[AccessPermission::Read, AccessPermission::Write]),
    (Role::Patient, ResourceType::AuditLog,   &[]),
    // 提供者：经授权可读（部分可写），永远不能删除患者数据
    (Role::Provider, ResourceType::Biomarker,  &[AccessPermission::Read, AccessPermission::Write]),
    (Role::Provider, ResourceType::Insurance,  &[AccessPermission::Read]),
    (Role::Provider, ResourceType::Dna,        &[AccessPermission::Read]),
    (Role::Provider, ResourceType::HealthNeed, &[AccessPermission::Read, AccessPermission::Write]),
    (Role::Provider, ResourceType::User,       &[AccessPermission::Read]),
    (Role::Provider, ResourceType::Consent,    &[AccessPermission::Read, AccessPermission::Write]),
    (Role::Provider, ResourceType::AuditLog,   &[]),
    // 管理员：全量权限
    (Role::Admin, ResourceType::Biomarker,  &[AccessPermission::Read, AccessPermission::Write, AccessPermission::Delete, AccessPermission::Admin]),
    (Role::Admin, ResourceType::Insurance,  &[AccessPermission::Read, AccessPermission::Write, AccessPermission::Delete, AccessPermission::Admin]),
    (Role::Admin, ResourceType::Dna,        &[AccessPermission::Read, AccessPermission::Write, AccessPermission::Delete, AccessPermission::Admin]),
    (Role::Admin, ResourceType::HealthNeed, &[AccessPermission::Read, AccessPermission::Write, AccessPermission::Delete, AccessPermission::Admin]),
    (Role::Admin, ResourceType::User,       &[AccessPermission::Read, AccessPermission::Write, AccessPermission::Delete, AccessPermission::Admin]),
    (Role::Admin, ResourceType::Consent,    &[AccessPermission::Read, AccessPermission::Write, AccessPermission::Delete, AccessPermission::Admin]),
    (Role::Admin, ResourceType::AuditLog,   &[AccessPermission::Read, AccessPermission::Write, AccessPermission::Delete, AccessPermission::Admin]),
];

static PERMISSION_MATRIX: Lazy<HashMap<(Role, ResourceType), &'static [AccessPermission]>> =
    Lazy::new(|| {
        PERMISSION_TABLE
            .iter()
            .map(|(role, resource, perms)| ((*role, *resource), *perms))
            .collect()
    });

/// 启动时校验矩阵完整性：每个 (角色, 资源) 对恰好一条显式条目。
/// 缺失条目是配置错误，必须阻止启动，而不是运行时静默拒绝。
pub fn validate_permission_matrix() -> Result<(), AppError> {
    if PERMISSION_MATRIX.len() != PERMISSION_TABLE.len() {
        return Err(AppError::Config(
            "permission matrix contains duplicate (role, resource) entries".to_string(),
        ));
    }

    for role in ALL_ROLES {
        for resource in ResourceType::ALL {
            if !PERMISSION_MATRIX.contains_key(&(role, resource)) {
                return Err(AppError::Config(format!(
                    "permission matrix is missing entry for ({}, {})",
                    role.as_str(),
                    resource.as_str()
                )));
            }
        }
    }

    Ok(())
}

/// 拒绝原因（类型化，用于日志与测试；对外消息始终不泄露资源存在性）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    InsufficientRole,
    PermissionNotGranted,
    NotResourceOwner,
    ConsentNotFound,
    ConsentNotActive,
    ConsentExpired,
    CapabilityNotGranted,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::InsufficientRole => "insufficient_role",
            DenialReason::PermissionNotGranted => "permission_not_granted",
            DenialReason::NotResourceOwner => "not_resource_owner",
            DenialReason::ConsentNotFound => "consent_not_found",
            DenialReason::ConsentNotActive => "consent_not_active",
            DenialReason::ConsentExpired => "consent_expired",
            DenialReason::CapabilityNotGranted => "capability_not_granted",
        }
    }
}

/// 所有守卫的统一判定类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Denied(DenialReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed)
    }

    /// 转换为 handler 可直接 `?` 的结果；拒绝映射为 403
    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            AccessDecision::Allowed => Ok(()),
            AccessDecision::Denied(reason) => {
                tracing::warn!(reason = reason.as_str(), "Access denied");
                Err(AppError::Forbidden)
            }
        }
    }

    /// 单个资源路由上的防御性映射：拒绝返回 404，
    /// 避免向未授权方确认资源存在。
    pub fn into_result_defensive(self) -> Result<(), AppError> {
        match self {
            AccessDecision::Allowed => Ok(()),
            AccessDecision::Denied(reason) => {
                tracing::warn!(reason = reason.as_str(), "Access denied (masked as not found)");
                Err(AppError::NotFound)
            }
        }
    }
}

/// 列表查询的范围注解（只注解，不拦截）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UserScope {
    #[serde(rename = "self")]
    Own,
    Provider,
    Admin,
}

impl UserScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserScope::Own => "self",
            UserScope::Provider => "provider",
            UserScope::Admin => "admin",
        }
    }
}

/// require_ownership 的结果：判定 + 解析出的授权关系，
/// 作为显式值随请求传递给下游，不修改框架的请求类型。
#[derive(Debug)]
pub struct OwnershipOutcome {
    pub decision: AccessDecision,
    pub relationship: Option<ConsentRelationship>,
}

/// 从请求中解析目标所有者：路径参数 > 查询参数 > 请求体。
/// 都不存在时视为访问调用者自己的数据。
pub fn resolve_target_owner(
    path_user_id: Option<Uuid>,
    query_user_id: Option<Uuid>,
    body_user_id: Option<Uuid>,
) -> Option<Uuid> {
    path_user_id.or(query_user_id).or(body_user_id)
}

/// (资源, 权限) 到授权能力标志的映射。
/// 未列出的组合一律显式拒绝，不存在隐式允许。
pub fn capability_for(
    resource: ResourceType,
    permission: AccessPermission,
) -> Option<ConsentCapability> {
    match (resource, permission) {
        (ResourceType::Biomarker | ResourceType::HealthNeed, AccessPermission::Read) => {
            Some(ConsentCapability::ViewBiomarkers)
        }
        (ResourceType::Biomarker | ResourceType::HealthNeed, AccessPermission::Write) => {
            Some(ConsentCapability::EditData)
        }
        (ResourceType::Insurance, AccessPermission::Read) => Some(ConsentCapability::ViewInsurance),
        (ResourceType::Dna, AccessPermission::Read) => Some(ConsentCapability::ViewDna),
        _ => None,
    }
}

/// 纯函数的授权关系判定，检查时惰性评估过期时间。
/// 撤销在请求中途提交时，进行中的请求不保证观察到；下一次请求重新评估。
pub fn evaluate_consent(
    relationship: Option<&ConsentRelationship>,
    resource: ResourceType,
    permission: AccessPermission,
    now: DateTime<Utc>,
) -> AccessDecision {
    let rel = match relationship {
        Some(rel) => rel,
        None => return AccessDecision::Denied(DenialReason::ConsentNotFound),
    };

    if rel.status != crate::models::consent::ConsentStatus::Active {
        return AccessDecision::Denied(DenialReason::ConsentNotActive);
    }

    if let Some(expires_at) = rel.consent_expires_at {
        if expires_at <= now {
            return AccessDecision::Denied(DenialReason::ConsentExpired);
        }
    }

    match capability_for(resource, permission) {
        Some(capability) if rel.has_capability(capability) => AccessDecision::Allowed,
        _ => AccessDecision::Denied(DenialReason::CapabilityNotGranted),
    }
}

/// 访问控制服务。守卫本身不持有跨请求状态，可并发共享。
pub struct AccessControlService {
    db: PgPool,
}

impl AccessControlService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 调用者角色在允许集合内
    pub fn require_role(&self, ctx: &AuthContext, allowed: &[Role]) -> AccessDecision {
        if allowed.contains(&ctx.role) {
            AccessDecision::Allowed
        } else {
            AccessDecision::Denied(DenialReason::InsufficientRole)
        }
    }

    /// 调用者角色层级不低于要求
    pub fn require_min_role(&self, ctx: &AuthContext, min: Role) -> AccessDecision {
        if ctx.role.level() >= min.level() {
            AccessDecision::Allowed
        } else {
            AccessDecision::Denied(DenialReason::InsufficientRole)
        }
    }

    /// 粗粒度矩阵检查，完全忽略所有权
    pub fn require_permission(
        &self,
        ctx: &AuthContext,
        resource: ResourceType,
        permission: AccessPermission,
    ) -> AccessDecision {
        let granted = PERMISSION_MATRIX
            .get(&(ctx.role, resource))
            .map(|perms| perms.contains(&permission));

        match granted {
            Some(true) => AccessDecision::Allowed,
            Some(false) => AccessDecision::Denied(DenialReason::PermissionNotGranted),
            None => {
                // 启动校验保证不可达；若到达这里按拒绝处理并告警
                tracing::error!(
                    role = ctx.role.as_str(),
                    resource = resource.as_str(),
                    "Permission matrix entry missing at runtime"
                );
                AccessDecision::Denied(DenialReason::PermissionNotGranted)
            }
        }
    }

    /// 完整的资源访问判定序列：
    /// 1. 矩阵禁止则拒绝；2. 管理员直接放行；
    /// 3. 目标所有者缺省为调用者自己；4. 患者只能访问自己的数据；
    /// 5. 提供者进入授权关系检查。
    pub async fn require_resource_access(
        &self,
        ctx: &AuthContext,
        resource: ResourceType,
        permission: AccessPermission,
        target_owner: Option<Uuid>,
    ) -> Result<AccessDecision, AppError> {
        if !self.require_permission(ctx, resource, permission).is_allowed() {
            return Ok(AccessDecision::Denied(DenialReason::PermissionNotGranted));
        }

        if ctx.role == Role::Admin {
            return Ok(AccessDecision::Allowed);
        }

        let owner = target_owner.unwrap_or(ctx.user_id);
        if owner == ctx.user_id {
            return Ok(AccessDecision::Allowed);
        }

        match ctx.role {
            Role::Patient => Ok(AccessDecision::Denied(DenialReason::NotResourceOwner)),
            Role::Provider => self.check_consent(ctx.user_id, owner, resource, permission).await,
            Role::Admin => Ok(AccessDecision::Allowed),
        }
    }

    /// 查找并评估 (提供者, 患者) 的授权关系
    pub async fn check_consent(
        &self,
        provider_id: Uuid,
        patient_id: Uuid,
        resource: ResourceType,
        permission: AccessPermission,
    ) -> Result<AccessDecision, AppError> {
        let repo = ConsentRepository::new(self.db.clone());
        let relationship = repo.find_by_pair(provider_id, patient_id).await?;

        Ok(evaluate_consent(
            relationship.as_ref(),
            resource,
            permission,
            Utc::now(),
        ))
    }

    /// 针对已加载资源的所有权检查（调用方先加载资源，缺失时返回 404）。
    /// 提供者走与 require_resource_access 相同的能力范围授权检查，
    /// 解析出的关系随结果返回给下游使用。
    pub async fn require_ownership(
        &self,
        ctx: &AuthContext,
        resource: ResourceType,
        permission: AccessPermission,
        owner_id: Uuid,
    ) -> Result<OwnershipOutcome, AppError> {
        if ctx.role == Role::Admin || owner_id == ctx.user_id {
            return Ok(OwnershipOutcome {
                decision: AccessDecision::Allowed,
                relationship: None,
            });
        }

        if ctx.role != Role::Provider {
            return Ok(OwnershipOutcome {
                decision: AccessDecision::Denied(DenialReason::NotResourceOwner),
                relationship: None,
            });
        }

        let repo = ConsentRepository::new(self.db.clone());
        let relationship = repo.find_by_pair(ctx.user_id, owner_id).await?;
        let decision = evaluate_consent(relationship.as_ref(), resource, permission, Utc::now());

        Ok(OwnershipOutcome {
            decision,
            relationship,
        })
    }

    /// 注解请求的查询范围（不拦截），供下游列表查询过滤
    pub fn enforce_user_scope(&self, ctx: &AuthContext, target_owner: Option<Uuid>) -> UserScope {
        if ctx.role == Role::Admin {
            return UserScope::Admin;
        }
        match target_owner {
            Some(owner) if owner != ctx.user_id => UserScope::Provider,
            _ => UserScope::Own,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::consent::ConsentStatus;
    use chrono::Duration;

    fn ctx(role: Role) -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    fn service() -> AccessControlService {
        // 纯判定路径不会触碰连接
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgresql://localhost:1/unreachable")
            .unwrap();
        AccessControlService::new(pool)
    }

    fn active_relationship(provider_id: Uuid, patient_id: Uuid) -> ConsentRelationship {
        let now = Utc::now();
        ConsentRelationship {
            id: Uuid::new_v4(),
            provider_id,
            patient_id,
            status: ConsentStatus::Active,
            view_biomarkers: true,
            view_insurance: false,
            view_dna: false,
            view_health_needs: false,
            edit_data: false,
            consent_granted_at: Some(now),
            consent_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_matrix_is_complete() {
        validate_permission_matrix().unwrap();
    }

    #[tokio::test]
    async fn test_matrix_exactness() {
        let svc = service();

        // 每个三元组都与文档化的静态表一致
        for role in ALL_ROLES {
            for resource in ResourceType::ALL {
                let expected: &[AccessPermission] = PERMISSION_TABLE
                    .iter()
                    .find(|(r, res, _)| *r == role && *res == resource)
                    .map(|(_, _, perms)| *perms)
                    .unwrap();

                for permission in AccessPermission::ALL {
                    let decision = svc.require_permission(&ctx(role), resource, permission);
                    assert_eq!(
                        decision.is_allowed(),
                        expected.contains(&permission),
                        "mismatch for ({:?}, {:?}, {:?})",
                        role,
                        resource,
                        permission
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn test_patient_never_has_admin_permission() {
        let svc = service();
        let patient = ctx(Role::Patient);

        for resource in ResourceType::ALL {
            assert!(!svc
                .require_permission(&patient, resource, AccessPermission::Admin)
                .is_allowed());
        }
    }

    #[tokio::test]
    async fn test_provider_never_deletes_biomarkers() {
        let svc = service();
        let decision = svc.require_permission(
            &ctx(Role::Provider),
            ResourceType::Biomarker,
            AccessPermission::Delete,
        );
        assert_eq!(
            decision,
            AccessDecision::Denied(DenialReason::PermissionNotGranted)
        );
    }

    #[tokio::test]
    async fn test_require_role_and_min_role() {
        let svc = service();

        assert!(svc
            .require_role(&ctx(Role::Provider), &[Role::Provider, Role::Admin])
            .is_allowed());
        assert!(!svc.require_role(&ctx(Role::Patient), &[Role::Admin]).is_allowed());

        assert!(svc.require_min_role(&ctx(Role::Admin), Role::Provider).is_allowed());
        assert!(!svc.require_min_role(&ctx(Role::Patient), Role::Provider).is_allowed());
    }

    #[test]
    fn test_resolve_target_owner_priority() {
        let path = Uuid::new_v4();
        let query = Uuid::new_v4();
        let body = Uuid::new_v4();

        assert_eq!(resolve_target_owner(Some(path), Some(query), Some(body)), Some(path));
        assert_eq!(resolve_target_owner(None, Some(query), Some(body)), Some(query));
        assert_eq!(resolve_target_owner(None, None, Some(body)), Some(body));
        assert_eq!(resolve_target_owner(None, None, None), None);
    }

    #[tokio::test]
    async fn test_patient_cannot_target_other_user() {
        let svc = service();
        let patient = ctx(Role::Patient);
        let other = Uuid::new_v4();

        // 矩阵允许 (patient, biomarker, read)，但所有权检查仍然拒绝
        let decision = svc
            .require_resource_access(
                &patient,
                ResourceType::Biomarker,
                AccessPermission::Read,
                Some(other),
            )
            .await
            .unwrap();

        assert_eq!(decision, AccessDecision::Denied(DenialReason::NotResourceOwner));
    }

    #[tokio::test]
    async fn test_missing_target_defaults_to_self() {
        let svc = service();
        let patient = ctx(Role::Patient);

        let decision = svc
            .require_resource_access(&patient, ResourceType::Biomarker, AccessPermission::Read, None)
            .await
            .unwrap();

        assert_eq!(decision, AccessDecision::Allowed);
    }

    #[tokio::test]
    async fn test_admin_bypasses_ownership() {
        let svc = service();
        let admin = ctx(Role::Admin);

        let decision = svc
            .require_resource_access(
                &admin,
                ResourceType::Dna,
                AccessPermission::Read,
                Some(Uuid::new_v4()),
            )
            .await
            .unwrap();

        assert_eq!(decision, AccessDecision::Allowed);
    }

    #[tokio::test]
    async fn test_matrix_deny_short_circuits_ownership() {
        let svc = service();
        let provider = ctx(Role::Provider);

        // (provider, biomarker, delete) 被矩阵直接拒绝，不进入授权关系查询
        let decision = svc
            .require_resource_access(
                &provider,
                ResourceType::Biomarker,
                AccessPermission::Delete,
                Some(Uuid::new_v4()),
            )
            .await
            .unwrap();

        assert_eq!(decision, AccessDecision::Denied(DenialReason::PermissionNotGranted));
    }

    #[test]
    fn test_consent_scenario_capability_scoping() {
        let provider_id = Uuid::new_v4();
        let patient_id = Uuid::new_v4();
        let rel = active_relationship(provider_id, patient_id);
        let now = Utc::now();

        // view_biomarkers=true, view_insurance=false
        assert_eq!(
            evaluate_consent(Some(&rel), ResourceType::Biomarker, AccessPermission::Read, now),
            AccessDecision::Allowed
        );
        assert_eq!(
            evaluate_consent(Some(&rel), ResourceType::Insurance, AccessPermission::Read, now),
            AccessDecision::Denied(DenialReason::CapabilityNotGranted)
        );
    }

    #[test]
    fn test_consent_expiration_denies_previous_grants() {
        let mut rel = active_relationship(Uuid::new_v4(), Uuid::new_v4());
        rel.consent_expires_at = Some(Utc::now() - Duration::days(1));
        let now = Utc::now();

        assert_eq!(
            evaluate_consent(Some(&rel), ResourceType::Biomarker, AccessPermission::Read, now),
            AccessDecision::Denied(DenialReason::ConsentExpired)
        );
        assert_eq!(
            evaluate_consent(Some(&rel), ResourceType::Insurance, AccessPermission::Read, now),
            AccessDecision::Denied(DenialReason::ConsentExpired)
        );
    }

    #[test]
    fn test_revoked_consent_denies_despite_capabilities() {
        let mut rel = active_relationship(Uuid::new_v4(), Uuid::new_v4());
        rel.status = ConsentStatus::Revoked;
        rel.view_insurance = true;
        rel.view_dna = true;
        rel.view_health_needs = true;
        rel.edit_data = true;

        assert_eq!(
            evaluate_consent(Some(&rel), ResourceType::Biomarker, AccessPermission::Read, Utc::now()),
            AccessDecision::Denied(DenialReason::ConsentNotActive)
        );
    }

    #[test]
    fn test_absent_consent_denies() {
        assert_eq!(
            evaluate_consent(None, ResourceType::Biomarker, AccessPermission::Read, Utc::now()),
            AccessDecision::Denied(DenialReason::ConsentNotFound)
        );
    }

    #[test]
    fn test_unmapped_capability_combinations_deny() {
        let mut rel = active_relationship(Uuid::new_v4(), Uuid::new_v4());
        rel.view_insurance = true;

        // insurance + write 没有对应能力标志，显式拒绝
        assert_eq!(
            evaluate_consent(Some(&rel), ResourceType::Insurance, AccessPermission::Write, Utc::now()),
            AccessDecision::Denied(DenialReason::CapabilityNotGranted)
        );
        // dna + write 同理
        assert_eq!(
            evaluate_consent(Some(&rel), ResourceType::Dna, AccessPermission::Write, Utc::now()),
            AccessDecision::Denied(DenialReason::CapabilityNotGranted)
        );
    }

    #[tokio::test]
    async fn test_user_scope_annotation() {
        let svc = service();
        let patient = ctx(Role::Patient);

        assert_eq!(svc.enforce_user_scope(&patient, None), UserScope::Own);
        assert_eq!(svc.enforce_user_scope(&patient, Some(patient.user_id)), UserScope::Own);
        assert_eq!(
            svc.enforce_user_scope(&ctx(Role::Provider), Some(Uuid::new_v4())),
            UserScope::Provider
        );
        assert_eq!(svc.enforce_user_scope(&ctx(Role::Admin), None), UserScope::Admin);
    }

    #[test]
    fn test_decision_into_result() {
        assert!(AccessDecision::Allowed.into_result().is_ok());
        assert!(matches!(
            AccessDecision::Denied(DenialReason::NotResourceOwner).into_result(),
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            AccessDecision::Denied(DenialReason::ConsentExpired).into_result_defensive(),
            Err(AppError::NotFound)
        ));
    }
}
