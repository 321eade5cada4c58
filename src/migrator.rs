use sea_orm::{EntityTrait, Schema};
use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_tenancy_tables::Migration),
            Box::new(m20240101_000002_create_inventory_tables::Migration),
            Box::new(m20240101_000003_create_site_tables::Migration),
        ]
    }
}

/// Creates the table for `entity` exactly as the entity declares it, including
/// single-column unique keys and foreign keys.
async fn create_entity_table<E>(manager: &SchemaManager<'_>, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    let schema = Schema::new(manager.get_database_backend());
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    manager.create_table(stmt).await
}

async fn drop_entity_table<E>(manager: &SchemaManager<'_>, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    manager
        .drop_table(Table::drop().table(entity).if_exists().to_owned())
        .await
}

mod m20240101_000001_create_tenancy_tables {
    use super::{create_entity_table, drop_entity_table};
    use crate::entities::{company, engineer, project, project_assignment, user};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_tenancy_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            create_entity_table(manager, company::Entity).await?;
            create_entity_table(manager, user::Entity).await?;
            create_entity_table(manager, engineer::Entity).await?;
            create_entity_table(manager, project::Entity).await?;
            create_entity_table(manager, project_assignment::Entity).await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_users_company_id")
                        .table(user::Entity)
                        .col(user::Column::CompanyId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_engineers_company_emp_id")
                        .table(engineer::Entity)
                        .col(engineer::Column::CompanyId)
                        .col(engineer::Column::EmpId)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_project_assignments_pair")
                        .table(project_assignment::Entity)
                        .col(project_assignment::Column::ProjectId)
                        .col(project_assignment::Column::UserId)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            drop_entity_table(manager, project_assignment::Entity).await?;
            drop_entity_table(manager, project::Entity).await?;
            drop_entity_table(manager, engineer::Entity).await?;
            drop_entity_table(manager, user::Entity).await?;
            drop_entity_table(manager, company::Entity).await
        }
    }
}

mod m20240101_000002_create_inventory_tables {
    use super::{create_entity_table, drop_entity_table};
    use crate::entities::{material, material_request, material_usage, notification, project_material};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_inventory_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            create_entity_table(manager, material::Entity).await?;
            create_entity_table(manager, project_material::Entity).await?;
            create_entity_table(manager, material_usage::Entity).await?;
            create_entity_table(manager, material_request::Entity).await?;
            create_entity_table(manager, notification::Entity).await?;

            // One allocation per (project, material).
            manager
                .create_index(
                    Index::create()
                        .name("idx_project_materials_pair")
                        .table(project_material::Entity)
                        .col(project_material::Column::ProjectId)
                        .col(project_material::Column::MaterialId)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_material_usages_project_id")
                        .table(material_usage::Entity)
                        .col(material_usage::Column::ProjectId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_material_requests_company_status")
                        .table(material_request::Entity)
                        .col(material_request::Column::CompanyId)
                        .col(material_request::Column::Status)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_notifications_recipient_id")
                        .table(notification::Entity)
                        .col(notification::Column::RecipientId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            drop_entity_table(manager, notification::Entity).await?;
            drop_entity_table(manager, material_request::Entity).await?;
            drop_entity_table(manager, material_usage::Entity).await?;
            drop_entity_table(manager, project_material::Entity).await?;
            drop_entity_table(manager, material::Entity).await
        }
    }
}

mod m20240101_000003_create_site_tables {
    use super::{create_entity_table, drop_entity_table};
    use crate::entities::{contract, labour, labour_payment, project_expense, project_file};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_site_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            create_entity_table(manager, labour::Entity).await?;
            create_entity_table(manager, labour_payment::Entity).await?;
            create_entity_table(manager, contract::Entity).await?;
            create_entity_table(manager, project_file::Entity).await?;
            create_entity_table(manager, project_expense::Entity).await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_labour_payments_labour_id")
                        .table(labour_payment::Entity)
                        .col(labour_payment::Column::LabourId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            drop_entity_table(manager, project_expense::Entity).await?;
            drop_entity_table(manager, project_file::Entity).await?;
            drop_entity_table(manager, contract::Entity).await?;
            drop_entity_table(manager, labour_payment::Entity).await?;
            drop_entity_table(manager, labour::Entity).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{company, material};
    use rust_decimal_macros::dec;
    use sea_orm::{ActiveModelTrait, Database, Set};

    #[tokio::test]
    async fn sqlite_schema_accepts_money_columns() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();

        let now = chrono::Utc::now();
        let owner = company::ActiveModel {
            name: Set("Acme Interiors".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        let created = material::ActiveModel {
            material_code: Set("MAT001".to_string()),
            name: Set("Teak veneer".to_string()),
            category: Set("Wood".to_string()),
            unit: Set("sheet".to_string()),
            default_rate: Set(dec!(99999.75)),
            company_id: Set(owner.id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        let stored = material::Entity::find_by_id(created.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.default_rate, dec!(99999.75));
    }
}
