use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "parameters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::product_parameters::Entity")]
    ProductParameters,
}

impl Related<super::product_parameters::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductParameters.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
