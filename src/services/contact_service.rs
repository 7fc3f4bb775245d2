use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::{
    dto::contacts::{ContactList, ContactRequest, DeleteItemsRequest},
    entity::contacts::{ActiveModel as ContactActive, Column as ContactCol, Entity as Contacts},
    error::{AppError, AppResult, FieldErrors},
    middleware::auth::AuthUser,
    models::Contact,
    response::{Affected, ApiResponse, Meta},
    state::AppState,
};

pub async fn list_contacts(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<ContactList>> {
    let items: Vec<Contact> = Contacts::find()
        .filter(ContactCol::UserId.eq(user.user_id))
        .order_by_asc(ContactCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Contact::from)
        .collect();

    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "OK",
        ContactList { items },
        Some(Meta::new(1, total, total)),
    ))
}

pub async fn create_contact(
    state: &AppState,
    user: &AuthUser,
    payload: ContactRequest,
) -> AppResult<ApiResponse<Contact>> {
    let mut errors = FieldErrors::new();
    for (field, value) in [
        ("city", &payload.city),
        ("street", &payload.street),
        ("phone", &payload.phone),
    ] {
        if value.as_deref().map(str::trim).unwrap_or_default().is_empty() {
            errors.insert(field.to_string(), vec!["This field is required.".into()]);
        }
    }
    if !errors.is_empty() {
        return Err(AppError::InvalidFields(errors));
    }

    let contact = ContactActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        city: Set(payload.city.unwrap_or_default()),
        street: Set(payload.street.unwrap_or_default()),
        house: Set(payload.house.unwrap_or_default()),
        structure: Set(payload.structure.unwrap_or_default()),
        building: Set(payload.building.unwrap_or_default()),
        apartment: Set(payload.apartment.unwrap_or_default()),
        phone: Set(payload.phone.unwrap_or_default()),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    Ok(ApiResponse::success(
        "Contact created",
        Contact::from(contact),
        Some(Meta::empty()),
    ))
}

pub async fn update_contact(
    state: &AppState,
    user: &AuthUser,
    payload: ContactRequest,
) -> AppResult<ApiResponse<Contact>> {
    let id = payload
        .id
        .ok_or_else(|| AppError::field("id", "This field is required."))?;

    let existing = Contacts::find()
        .filter(
            Condition::all()
                .add(ContactCol::Id.eq(id))
                .add(ContactCol::UserId.eq(user.user_id)),
        )
        .one(&state.orm)
        .await?;
    let existing = match existing {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };

    let mut active: ContactActive = existing.into();
    if let Some(city) = payload.city {
        active.city = Set(city);
    }
    if let Some(street) = payload.street {
        active.street = Set(street);
    }
    if let Some(house) = payload.house {
        active.house = Set(house);
    }
    if let Some(structure) = payload.structure {
        active.structure = Set(structure);
    }
    if let Some(building) = payload.building {
        active.building = Set(building);
    }
    if let Some(apartment) = payload.apartment {
        active.apartment = Set(apartment);
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(phone);
    }
    let contact = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Updated",
        Contact::from(contact),
        Some(Meta::empty()),
    ))
}

pub async fn delete_contacts(
    state: &AppState,
    user: &AuthUser,
    payload: DeleteItemsRequest,
) -> AppResult<ApiResponse<Affected>> {
    let ids = parse_id_list(&payload.items)?;

    let result = Contacts::delete_many()
        .filter(
            Condition::all()
                .add(ContactCol::UserId.eq(user.user_id))
                .add(ContactCol::Id.is_in(ids)),
        )
        .exec(&state.orm)
        .await?;

    Ok(ApiResponse::success(
        "Deleted",
        Affected {
            count: result.rows_affected,
        },
        Some(Meta::empty()),
    ))
}

/// Parses `"id1,id2"` style lists used by the delete endpoints.
pub fn parse_id_list(items: &str) -> AppResult<Vec<Uuid>> {
    let ids = items
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Uuid::parse_str(s).map_err(|_| AppError::field("items", format!("'{s}' is not a valid id")))
        })
        .collect::<AppResult<Vec<_>>>()?;
    if ids.is_empty() {
        return Err(AppError::field("items", "This field is required."));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_list_accepts_spaces_and_trailing_commas() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ids = parse_id_list(&format!("{a}, {b},")).unwrap();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn id_list_rejects_garbage_and_empty_input() {
        assert!(parse_id_list("not-an-id").is_err());
        assert!(parse_id_list(" , ").is_err());
    }
}
