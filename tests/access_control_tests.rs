//! 访问控制的可测属性
//!
//! 矩阵精确性、所有权闸门、授权关系场景——纯判定路径不需要数据库。

mod common;

use chrono::{Duration, Utc};
use phr_system::auth::middleware::AuthContext;
use phr_system::models::consent::{ConsentRelationship, ConsentStatus};
use phr_system::models::user::Role;
use phr_system::services::access_control_service::{
    capability_for, evaluate_consent, validate_permission_matrix, AccessControlService,
    AccessDecision, AccessPermission, DenialReason, ResourceType,
};
use uuid::Uuid;

fn ctx(role: Role) -> AuthContext {
    AuthContext {
        user_id: Uuid::new_v4(),
        role,
    }
}

fn service() -> AccessControlService {
    AccessControlService::new(common::lazy_unreachable_pool())
}

fn relationship(status: ConsentStatus) -> ConsentRelationship {
    let now = Utc::now();
    ConsentRelationship {
        id: Uuid::new_v4(),
        provider_id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        status,
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
fn test_matrix_validates_at_startup() {
    validate_permission_matrix().unwrap();
}

#[tokio::test]
async fn test_documented_matrix_rows() {
    let svc = service();

    // 患者
    let patient = ctx(Role::Patient);
    assert!(svc
        .require_permission(&patient, ResourceType::Biomarker, AccessPermission::Delete)
        .is_allowed());
    assert!(!svc
        .require_permission(&patient, ResourceType::AuditLog, AccessPermission::Read)
        .is_allowed());
    for resource in ResourceType::ALL {
        assert!(
            !svc.require_permission(&patient, resource, AccessPermission::Admin)
                .is_allowed(),
            "patient must never hold admin on {:?}",
            resource
        );
    }

    // 提供者
    let provider = ctx(Role::Provider);
    assert!(svc
        .require_permission(&provider, ResourceType::Biomarker, AccessPermission::Write)
        .is_allowed());
    assert!(!svc
        .require_permission(&provider, ResourceType::Biomarker, AccessPermission::Delete)
        .is_allowed());
    assert!(!svc
        .require_permission(&provider, ResourceType::Insurance, AccessPermission::Write)
        .is_allowed());
    assert!(!svc
        .require_permission(&provider, ResourceType::AuditLog, AccessPermission::Read)
        .is_allowed());

    // 管理员对所有资源持有全部权限
    let admin = ctx(Role::Admin);
    for resource in ResourceType::ALL {
        for permission in AccessPermission::ALL {
            assert!(svc.require_permission(&admin, resource, permission).is_allowed());
        }
    }
}

#[tokio::test]
async fn test_role_guards() {
    let svc = service();

    assert!(svc
        .require_role(&ctx(Role::Admin), &[Role::Provider, Role::Admin])
        .is_allowed());
    assert_eq!(
        svc.require_role(&ctx(Role::Patient), &[Role::Provider]),
        AccessDecision::Denied(DenialReason::InsufficientRole)
    );

    // 层级检查：高角色满足低要求，反之不成立
    assert!(svc.require_min_role(&ctx(Role::Admin), Role::Patient).is_allowed());
    assert!(svc.require_min_role(&ctx(Role::Provider), Role::Provider).is_allowed());
    assert!(!svc.require_min_role(&ctx(Role::Patient), Role::Admin).is_allowed());
}

#[tokio::test]
async fn test_patient_denied_on_foreign_target_regardless_of_matrix() {
    let svc = service();
    let patient = ctx(Role::Patient);

    for permission in [AccessPermission::Read, AccessPermission::Write, AccessPermission::Delete] {
        let decision = svc
            .require_resource_access(
                &patient,
                ResourceType::Biomarker,
                permission,
                Some(Uuid::new_v4()),
            )
            .await
            .unwrap();

        assert_eq!(decision, AccessDecision::Denied(DenialReason::NotResourceOwner));
    }
}

#[tokio::test]
async fn test_self_target_and_missing_target_allowed_for_patient() {
    let svc = service();
    let patient = ctx(Role::Patient);

    let explicit_self = svc
        .require_resource_access(
            &patient,
            ResourceType::Biomarker,
            AccessPermission::Read,
            Some(patient.user_id),
        )
        .await
        .unwrap();
    assert_eq!(explicit_self, AccessDecision::Allowed);

    let implicit_self = svc
        .require_resource_access(&patient, ResourceType::Biomarker, AccessPermission::Read, None)
        .await
        .unwrap();
    assert_eq!(implicit_self, AccessDecision::Allowed);
}

#[test]
fn test_capability_map_is_explicit() {
    use phr_system::models::consent::ConsentCapability;

    assert_eq!(
        capability_for(ResourceType::Biomarker, AccessPermission::Read),
        Some(ConsentCapability::ViewBiomarkers)
    );
    assert_eq!(
        capability_for(ResourceType::HealthNeed, AccessPermission::Read),
        Some(ConsentCapability::ViewBiomarkers)
    );
    assert_eq!(
        capability_for(ResourceType::Biomarker, AccessPermission::Write),
        Some(ConsentCapability::EditData)
    );
    assert_eq!(
        capability_for(ResourceType::Insurance, AccessPermission::Read),
        Some(ConsentCapability::ViewInsurance)
    );
    assert_eq!(
        capability_for(ResourceType::Dna, AccessPermission::Read),
        Some(ConsentCapability::ViewDna)
    );

    // 未映射的组合一律 None（显式拒绝，不存在隐式允许）
    assert_eq!(capability_for(ResourceType::Insurance, AccessPermission::Delete), None);
    assert_eq!(capability_for(ResourceType::Dna, AccessPermission::Write), None);
    assert_eq!(capability_for(ResourceType::AuditLog, AccessPermission::Read), None);
    assert_eq!(capability_for(ResourceType::Consent, AccessPermission::Read), None);
}

#[test]
fn test_capability_scoped_consent_grants() {
    // {status: ACTIVE, view_biomarkers: true, view_insurance: false, expires: null}
    let rel = relationship(ConsentStatus::Active);
    let now = Utc::now();

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
fn test_consent_expiry_flips_both_checks_to_deny() {
    let mut rel = relationship(ConsentStatus::Active);
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
fn test_revoked_denies_with_all_capabilities_set() {
    let mut rel = relationship(ConsentStatus::Revoked);
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
fn test_pending_is_not_a_grant() {
    let rel = relationship(ConsentStatus::Pending);

    assert_eq!(
        evaluate_consent(Some(&rel), ResourceType::Biomarker, AccessPermission::Read, Utc::now()),
        AccessDecision::Denied(DenialReason::ConsentNotActive)
    );
}

#[test]
fn test_expiry_boundary_is_exclusive() {
    let mut rel = relationship(ConsentStatus::Active);
    let now = Utc::now();

    // 恰好在过期时刻：不再有效
    rel.consent_expires_at = Some(now);
    assert_eq!(
        evaluate_consent(Some(&rel), ResourceType::Biomarker, AccessPermission::Read, now),
        AccessDecision::Denied(DenialReason::ConsentExpired)
    );

    // 还有一秒：有效
    rel.consent_expires_at = Some(now + Duration::seconds(1));
    assert_eq!(
        evaluate_consent(Some(&rel), ResourceType::Biomarker, AccessPermission::Read, now),
        AccessDecision::Allowed
    );
}

#[tokio::test]
async fn test_ownership_outcome_for_admin_and_owner() {
    let svc = service();

    let admin = ctx(Role::Admin);
    let outcome = svc
        .require_ownership(
            &admin,
            ResourceType::Biomarker,
            AccessPermission::Read,
            Uuid::new_v4(),
        )
        .await
        .unwrap();
    assert!(outcome.decision.is_allowed());
    assert!(outcome.relationship.is_none());

    let patient = ctx(Role::Patient);
    let outcome = svc
        .require_ownership(
            &patient,
            ResourceType::Biomarker,
            AccessPermission::Read,
            patient.user_id,
        )
        .await
        .unwrap();
    assert!(outcome.decision.is_allowed());

    let outcome = svc
        .require_ownership(
            &patient,
            ResourceType::Biomarker,
            AccessPermission::Read,
            Uuid::new_v4(),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome.decision,
        AccessDecision::Denied(DenialReason::NotResourceOwner)
    );
}
