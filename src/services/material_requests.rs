use crate::{
    auth::AuthUser,
    db::{with_transaction, DbPool},
    entities::{
        material,
        material_request::{self, RequestStatus, RequestType},
        notification::NotificationKind,
        project, user,
    },
    errors::ServiceError,
    services::{
        codes,
        materials::{self, NewMaterial},
        notifications::Notifier,
        project_materials, scope,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use validator::Validate;

/// Body of a new material request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitMaterialRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Unit is required"))]
    pub unit: String,
    #[schema(example = "150.00")]
    pub default_rate: Option<Decimal>,
    pub vendor: Option<String>,
    pub description: Option<String>,
    /// GLOBAL, PROJECT or PROJECT_MATERIAL
    #[serde(rename = "type")]
    #[schema(example = "PROJECT_MATERIAL")]
    pub request_type: Option<String>,
    pub project_id: Option<i32>,
    pub material_id: Option<i32>,
    pub quantity: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproveMaterialRequest {
    pub approval_notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RejectMaterialRequest {
    pub rejection_reason: Option<String>,
}

/// A request together with the display names of what it references
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    #[serde(flatten)]
    pub request: material_request::Model,
    pub project_name: Option<String>,
    pub material_name: Option<String>,
    pub employee_name: Option<String>,
    pub reviewer_name: Option<String>,
}

/// Request fields after validation, with the type-dependent targets resolved.
#[derive(Debug, Clone, PartialEq)]
struct ValidatedRequest {
    request_type: RequestType,
    default_rate: Decimal,
    project_id: Option<i32>,
    material_id: Option<i32>,
    quantity: Option<Decimal>,
}

fn validate_submission(input: &SubmitMaterialRequest) -> Result<ValidatedRequest, ServiceError> {
    input.validate()?;

    let request_type = input
        .request_type
        .as_deref()
        .ok_or_else(|| ServiceError::ValidationError("Request type is required".to_string()))
        .and_then(|raw| {
            RequestType::parse(raw.trim())
                .ok_or_else(|| ServiceError::ValidationError("Invalid request type".to_string()))
        })?;

    let default_rate = input
        .default_rate
        .ok_or_else(|| ServiceError::ValidationError("Default rate is required".to_string()))?;
    if default_rate < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Default rate cannot be negative".to_string(),
        ));
    }

    if let Some(quantity) = input.quantity {
        if quantity <= Decimal::ZERO && request_type != RequestType::Global {
            return Err(ServiceError::ValidationError(
                "Quantity must be greater than zero".to_string(),
            ));
        }
    }

    let validated = match request_type {
        RequestType::Global => ValidatedRequest {
            request_type,
            default_rate,
            project_id: None,
            material_id: None,
            quantity: None,
        },
        RequestType::Project => match (input.project_id, input.quantity) {
            (Some(project_id), Some(quantity)) => ValidatedRequest {
                request_type,
                default_rate,
                project_id: Some(project_id),
                material_id: None,
                quantity: Some(quantity),
            },
            _ => {
                return Err(ServiceError::ValidationError(
                    "Project ID and quantity are required for project-specific materials"
                        .to_string(),
                ))
            }
        },
        RequestType::ProjectMaterial => {
            match (input.project_id, input.material_id, input.quantity) {
                (Some(project_id), Some(material_id), Some(quantity)) => ValidatedRequest {
                    request_type,
                    default_rate,
                    project_id: Some(project_id),
                    material_id: Some(material_id),
                    quantity: Some(quantity),
                },
                _ => {
                    return Err(ServiceError::ValidationError(
                        "Project ID, material ID, and quantity are required".to_string(),
                    ))
                }
            }
        }
    };

    Ok(validated)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn already_reviewed() -> ServiceError {
    ServiceError::Conflict("Request has already been reviewed".to_string())
}

/// Moves a request out of PENDING. Zero rows touched means another reviewer
/// got there first.
async fn close_pending<C>(
    db: &C,
    request_id: i32,
    changes: material_request::ActiveModel,
) -> Result<material_request::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let result = material_request::Entity::update_many()
        .set(changes)
        .col_expr(material_request::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(material_request::Column::Id.eq(request_id))
        .filter(material_request::Column::Status.eq(RequestStatus::Pending))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(already_reviewed());
    }

    material_request::Entity::find_by_id(request_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Request not found".to_string()))
}

/// Applies the inventory side of an approved request.
async fn apply_approval<C>(db: &C, request: &material_request::Model) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let required_quantity = || {
        request.quantity.ok_or_else(|| {
            ServiceError::InternalError(format!("request {} has no quantity", request.request_code))
        })
    };
    let required_project = || {
        request.project_id.ok_or_else(|| {
            ServiceError::InternalError(format!("request {} has no project", request.request_code))
        })
    };

    match request.request_type {
        RequestType::Global => {
            let created =
                materials::insert_material(db, request.company_id, NewMaterial::from(request))
                    .await?;
            info!(material_code = %created.material_code, "material created from request");
        }
        RequestType::Project => {
            let project_id = required_project()?;
            let quantity = required_quantity()?;
            scope::company_project(db, request.company_id, project_id).await?;

            let created =
                materials::insert_material(db, request.company_id, NewMaterial::from(request))
                    .await?;
            project_materials::insert_allocation(db, project_id, created.id, quantity).await?;
            info!(
                material_code = %created.material_code,
                project_id,
                "material created and allocated from request"
            );
        }
        RequestType::ProjectMaterial => {
            let project_id = required_project()?;
            let quantity = required_quantity()?;
            let material_id = request.material_id.ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "request {} has no material",
                    request.request_code
                ))
            })?;
            scope::company_project(db, request.company_id, project_id).await?;
            scope::company_material(db, request.company_id, material_id).await?;

            match project_materials::find_allocation(db, project_id, material_id).await? {
                Some(existing) => {
                    let topped_up = existing.assigned + quantity;
                    project_materials::set_assigned(db, existing, topped_up).await?;
                    info!(project_id, material_id, assigned = %topped_up, "allocation topped up");
                }
                None => {
                    project_materials::insert_allocation(db, project_id, material_id, quantity)
                        .await?;
                    info!(project_id, material_id, "allocation created from request");
                }
            }
        }
    }
    Ok(())
}

/// Submission and review of material requests
#[derive(Clone)]
pub struct MaterialRequestService {
    db_pool: Arc<DbPool>,
    notifier: Arc<dyn Notifier>,
}

impl MaterialRequestService {
    pub fn new(db_pool: Arc<DbPool>, notifier: Arc<dyn Notifier>) -> Self {
        Self { db_pool, notifier }
    }

    /// Notification delivery never fails the operation that triggered it.
    async fn notify(&self, recipient_id: i32, message: String, kind: NotificationKind) {
        if let Err(e) = self.notifier.notify(recipient_id, &message, kind).await {
            error!(recipient_id, %kind, "failed to deliver notification: {}", e);
        }
    }

    async fn views(
        &self,
        requests: Vec<material_request::Model>,
    ) -> Result<Vec<RequestView>, ServiceError> {
        let db = &*self.db_pool;

        let project_ids: Vec<i32> = requests.iter().filter_map(|r| r.project_id).collect();
        let material_ids: Vec<i32> = requests.iter().filter_map(|r| r.material_id).collect();
        let user_ids: Vec<i32> = requests
            .iter()
            .flat_map(|r| std::iter::once(r.employee_id).chain(r.reviewed_by))
            .collect();

        let projects: HashMap<i32, String> = project::Entity::find()
            .filter(project::Column::Id.is_in(project_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();
        let materials: HashMap<i32, String> = material::Entity::find()
            .filter(material::Column::Id.is_in(material_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect();
        let users: HashMap<i32, String> = user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id, u.name))
            .collect();

        Ok(requests
            .into_iter()
            .map(|request| RequestView {
                project_name: request.project_id.and_then(|id| projects.get(&id).cloned()),
                material_name: request.material_id.and_then(|id| materials.get(&id).cloned()),
                employee_name: users.get(&request.employee_id).cloned(),
                reviewer_name: request.reviewed_by.and_then(|id| users.get(&id).cloned()),
                request,
            })
            .collect())
    }

    async fn view(&self, request: material_request::Model) -> Result<RequestView, ServiceError> {
        let mut views = self.views(vec![request]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError("request view missing".to_string()))
    }

    /// Requests submitted by `employee_id`, newest first.
    #[instrument(skip(self))]
    pub async fn my_requests(&self, employee_id: i32) -> Result<Vec<RequestView>, ServiceError> {
        let requests = material_request::Entity::find()
            .filter(material_request::Column::EmployeeId.eq(employee_id))
            .order_by_desc(material_request::Column::CreatedAt)
            .order_by_desc(material_request::Column::Id)
            .all(&*self.db_pool)
            .await?;
        self.views(requests).await
    }

    #[instrument(skip(self))]
    pub async fn pending(&self, company_id: i32) -> Result<Vec<RequestView>, ServiceError> {
        let requests = material_request::Entity::find()
            .filter(material_request::Column::CompanyId.eq(company_id))
            .filter(material_request::Column::Status.eq(RequestStatus::Pending))
            .order_by_desc(material_request::Column::CreatedAt)
            .order_by_desc(material_request::Column::Id)
            .all(&*self.db_pool)
            .await?;
        self.views(requests).await
    }

    #[instrument(skip(self))]
    pub async fn all(&self, company_id: i32) -> Result<Vec<RequestView>, ServiceError> {
        let requests = material_request::Entity::find()
            .filter(material_request::Column::CompanyId.eq(company_id))
            .order_by_desc(material_request::Column::CreatedAt)
            .order_by_desc(material_request::Column::Id)
            .all(&*self.db_pool)
            .await?;
        self.views(requests).await
    }

    /// Stores a new PENDING request under a fresh REQ code.
    #[instrument(skip(self, input), fields(user_id = submitter.user_id))]
    pub async fn submit(
        &self,
        submitter: &AuthUser,
        input: SubmitMaterialRequest,
    ) -> Result<RequestView, ServiceError> {
        let validated = validate_submission(&input)?;
        let db = &*self.db_pool;

        if let Some(project_id) = validated.project_id {
            scope::company_project(db, submitter.company_id, project_id).await?;
        }
        if let Some(material_id) = validated.material_id {
            scope::company_material(db, submitter.company_id, material_id).await?;
        }

        let employee_id = submitter.user_id;
        let company_id = submitter.company_id;

        let created = codes::retry_on_code_collision("submit_material_request", || {
            let input = input.clone();
            let validated = validated.clone();
            with_transaction::<_, _, ServiceError>(db, move |txn| {
                Box::pin(async move {
                    let request_code = codes::next_request_code(txn).await?;
                    let now = Utc::now();
                    let row = material_request::ActiveModel {
                        request_code: Set(request_code),
                        employee_id: Set(employee_id),
                        company_id: Set(company_id),
                        name: Set(input.name.trim().to_string()),
                        category: Set(input.category.trim().to_string()),
                        unit: Set(input.unit.trim().to_string()),
                        default_rate: Set(validated.default_rate),
                        vendor: Set(non_blank(input.vendor)),
                        description: Set(non_blank(input.description)),
                        request_type: Set(validated.request_type),
                        project_id: Set(validated.project_id),
                        material_id: Set(validated.material_id),
                        quantity: Set(validated.quantity),
                        status: Set(RequestStatus::Pending),
                        request_date: Set(now),
                        created_at: Set(now),
                        updated_at: Set(now),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;
                    Ok(row)
                })
            })
        })
        .await?;

        info!(
            request_code = %created.request_code,
            request_type = ?created.request_type,
            "material request submitted"
        );

        self.notify(
            created.employee_id,
            format!(
                "Material request for \"{}\" has been submitted for approval",
                created.name
            ),
            NotificationKind::Info,
        )
        .await;

        self.view(created).await
    }

    /// Loads a request for review: 404 if absent, 403 for another company,
    /// 409 once it has left PENDING.
    async fn reviewable(
        &self,
        reviewer: &AuthUser,
        request_id: i32,
    ) -> Result<material_request::Model, ServiceError> {
        let request = material_request::Entity::find_by_id(request_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Request not found".to_string()))?;

        scope::ensure_same_company(request.company_id, reviewer.company_id)?;

        if request.status.is_terminal() {
            return Err(already_reviewed());
        }
        Ok(request)
    }

    /// Approves a PENDING request and applies its inventory effect in the same
    /// transaction.
    #[instrument(skip(self, input), fields(reviewer_id = reviewer.user_id))]
    pub async fn approve(
        &self,
        reviewer: &AuthUser,
        request_id: i32,
        input: ApproveMaterialRequest,
    ) -> Result<RequestView, ServiceError> {
        self.reviewable(reviewer, request_id).await?;

        let db = &*self.db_pool;
        let reviewer_id = reviewer.user_id;
        let notes = non_blank(input.approval_notes);

        let approved = codes::retry_on_code_collision("approve_material_request", || {
            let notes = notes.clone();
            with_transaction::<_, _, ServiceError>(db, move |txn| {
                Box::pin(async move {
                    let changes = material_request::ActiveModel {
                        status: Set(RequestStatus::Approved),
                        reviewed_by: Set(Some(reviewer_id)),
                        review_date: Set(Some(Utc::now())),
                        approval_notes: Set(notes),
                        ..Default::default()
                    };
                    let approved = close_pending(txn, request_id, changes).await?;
                    apply_approval(txn, &approved).await?;
                    Ok(approved)
                })
            })
        })
        .await?;

        info!(request_code = %approved.request_code, "material request approved");

        self.notify(
            approved.employee_id,
            format!("Your request for \"{}\" has been approved", approved.name),
            NotificationKind::Success,
        )
        .await;

        self.view(approved).await
    }

    /// Rejects a PENDING request. No inventory changes.
    #[instrument(skip(self, input), fields(reviewer_id = reviewer.user_id))]
    pub async fn reject(
        &self,
        reviewer: &AuthUser,
        request_id: i32,
        input: RejectMaterialRequest,
    ) -> Result<RequestView, ServiceError> {
        let reason = non_blank(input.rejection_reason).ok_or_else(|| {
            ServiceError::ValidationError("Rejection reason is required".to_string())
        })?;

        self.reviewable(reviewer, request_id).await?;

        let changes = material_request::ActiveModel {
            status: Set(RequestStatus::Rejected),
            reviewed_by: Set(Some(reviewer.user_id)),
            review_date: Set(Some(Utc::now())),
            rejection_reason: Set(Some(reason.clone())),
            ..Default::default()
        };
        let rejected = with_transaction::<_, _, ServiceError>(&self.db_pool, move |txn| {
            Box::pin(async move { close_pending(txn, request_id, changes).await })
        })
        .await?;

        info!(request_code = %rejected.request_code, "material request rejected");

        self.notify(
            rejected.employee_id,
            format!(
                "Your request for \"{}\" has been rejected: {}",
                rejected.name, reason
            ),
            NotificationKind::Error,
        )
        .await;

        self.view(rejected).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn base(kind: &str) -> SubmitMaterialRequest {
        SubmitMaterialRequest {
            name: "Teak plywood".into(),
            category: "Wood".into(),
            unit: "sheet".into(),
            default_rate: Some(dec!(150.00)),
            request_type: Some(kind.into()),
            ..Default::default()
        }
    }

    #[test]
    fn global_request_drops_targets() {
        let mut input = base("GLOBAL");
        input.project_id = Some(3);
        input.quantity = Some(dec!(5));
        let validated = validate_submission(&input).unwrap();
        assert_eq!(validated.request_type, RequestType::Global);
        assert_eq!(validated.project_id, None);
        assert_eq!(validated.quantity, None);
        assert_eq!(validated.default_rate, dec!(150.00));
    }

    #[test]
    fn project_request_needs_project_and_quantity() {
        let mut input = base("PROJECT");
        assert_matches!(
            validate_submission(&input),
            Err(ServiceError::ValidationError(_))
        );
        input.project_id = Some(3);
        input.quantity = Some(dec!(12));
        let validated = validate_submission(&input).unwrap();
        assert_eq!(validated.material_id, None);
        assert_eq!(validated.quantity, Some(dec!(12)));
    }

    #[test]
    fn project_material_request_needs_all_targets() {
        let mut input = base("PROJECT_MATERIAL");
        input.project_id = Some(3);
        input.quantity = Some(dec!(50));
        assert_matches!(
            validate_submission(&input),
            Err(ServiceError::ValidationError(msg)) if msg.contains("material ID")
        );
        input.material_id = Some(7);
        assert!(validate_submission(&input).is_ok());
    }

    #[test]
    fn unknown_type_and_missing_fields_are_rejected() {
        assert_matches!(
            validate_submission(&base("BULK")),
            Err(ServiceError::ValidationError(msg)) if msg == "Invalid request type"
        );

        let mut input = base("GLOBAL");
        input.request_type = None;
        assert_matches!(validate_submission(&input), Err(ServiceError::ValidationError(_)));

        let mut input = base("GLOBAL");
        input.name = String::new();
        assert_matches!(validate_submission(&input), Err(ServiceError::ValidationError(_)));

        let mut input = base("GLOBAL");
        input.default_rate = None;
        assert_matches!(validate_submission(&input), Err(ServiceError::ValidationError(_)));

        let mut input = base("PROJECT");
        input.project_id = Some(1);
        input.quantity = Some(dec!(0));
        assert_matches!(validate_submission(&input), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn blank_strings_become_none() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(Some(" ok ".into())), Some("ok".to_string()));
        assert_eq!(non_blank(None), None);
    }
}
