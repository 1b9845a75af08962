//! Agent entity model
//!
//! Agents are the people credited by attribution results. An agent optionally belongs
//! to a team and a vendor, which is how results derive their team/vendor targets.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "agents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    pub vendor_id: Option<Uuid>,

    pub team_id: Option<Uuid>,

    /// Identifier of the agent in the telephony/chat platform, unique per tenant
    pub external_agent_id: String,

    pub name: String,

    pub email: Option<String>,

    pub is_active: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
