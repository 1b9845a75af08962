//! AttributionResult entity model
//!
//! One row per `(run, conversion, interaction)`: the share of a conversion's value
//! credited to one touchpoint.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "attribution_results")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub attribution_run_id: Uuid,

    pub conversion_event_id: Uuid,

    pub interaction_id: Uuid,

    pub customer_id: Uuid,

    pub agent_id: Option<Uuid>,

    pub team_id: Option<Uuid>,

    pub vendor_id: Option<Uuid>,

    pub channel_id: Option<Uuid>,

    pub model_id: Uuid,

    /// Fraction of the conversion credited to this touchpoint, in `[0, 1]`
    #[sea_orm(column_type = "Double")]
    pub attribution_weight: f64,

    /// `amount_decimal * attribution_weight`
    #[sea_orm(column_type = "Double")]
    pub attributed_amount: f64,

    pub is_primary_touch: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::attribution_run::Entity",
        from = "Column::AttributionRunId",
        to = "super::attribution_run::Column::Id"
    )]
    Run,
}

impl Related<super::attribution_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Run.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
