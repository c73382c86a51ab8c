//! In-memory container for members, profile field groups, profile fields,
//! field meta and member field data.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::CommunityError;
use crate::member::{Member, Role};
use crate::profile::{
    FieldChanges, FieldGroup, FieldQuery, FieldType, NewField, NewFieldGroup, NewOption,
    OrderBy, ProfileField,
};

#[derive(Debug)]
struct CommunityState {
    members: BTreeMap<u64, Member>,
    groups: BTreeMap<u64, FieldGroup>,
    fields: BTreeMap<u64, ProfileField>,
    field_meta: HashMap<u64, HashMap<String, serde_json::Value>>,
    /// Keyed by (field id, member id)
    field_data: HashMap<(u64, u64), Vec<String>>,
    next_member_id: u64,
    next_group_id: u64,
    next_field_id: u64,
}

impl Default for CommunityState {
    fn default() -> Self {
        Self {
            members: BTreeMap::new(),
            groups: BTreeMap::new(),
            fields: BTreeMap::new(),
            field_meta: HashMap::new(),
            field_data: HashMap::new(),
            next_member_id: 1,
            next_group_id: 1,
            next_field_id: 1,
        }
    }
}

impl CommunityState {
    fn group_order(&self, group_id: u64) -> u32 {
        self.groups
            .get(&group_id)
            .map(|g| g.group_order)
            .unwrap_or(u32::MAX)
    }

    fn children_of(&self, parent_id: u64) -> Vec<u64> {
        self.fields
            .values()
            .filter(|f| f.parent_id == parent_id)
            .map(|f| f.id)
            .collect()
    }

    fn insert_options(&mut self, parent: &ProfileField, options: &[NewOption]) {
        for (index, option) in options.iter().enumerate() {
            let id = self.next_field_id;
            self.next_field_id += 1;
            self.fields.insert(
                id,
                ProfileField {
                    id,
                    group_id: parent.group_id,
                    parent_id: parent.id,
                    field_type: FieldType::Option,
                    name: option.name.trim().to_string(),
                    description: String::new(),
                    is_required: false,
                    can_delete: true,
                    field_order: 0,
                    option_order: index as u32 + 1,
                    order_by: OrderBy::Asc,
                    is_default_option: option.is_default_option,
                    visibility_level: parent.visibility_level,
                },
            );
        }
    }

    /// Copies a field, its options and their meta.
    fn snapshot(&self, id: u64) -> Result<FieldSnapshot, CommunityError> {
        let field = self
            .fields
            .get(&id)
            .cloned()
            .ok_or(CommunityError::FieldNotFound { id })?;
        let options: Vec<ProfileField> = self
            .fields
            .values()
            .filter(|f| f.parent_id == id)
            .cloned()
            .collect();
        let meta = std::iter::once(id)
            .chain(options.iter().map(|o| o.id))
            .filter_map(|fid| self.field_meta.get(&fid).map(|m| (fid, m.clone())))
            .collect();
        Ok(FieldSnapshot {
            field,
            options,
            meta,
        })
    }

    /// Removes a field row together with everything hanging off it.
    fn remove_field_tree(&mut self, id: u64) {
        for child in self.children_of(id) {
            self.remove_field_tree(child);
        }
        self.fields.remove(&id);
        self.field_meta.remove(&id);
        self.field_data.retain(|(field_id, _), _| *field_id != id);
    }

    fn validate_parent(&self, parent_id: u64, group_id: u64) -> Result<(), CommunityError> {
        if parent_id == 0 {
            return Ok(());
        }
        match self.fields.get(&parent_id) {
            Some(parent) if parent.group_id == group_id && parent.parent_id == 0 => Ok(()),
            Some(_) => Err(CommunityError::invalid(
                "parent_id",
                format!("field {} is not a top-level field of group {}", parent_id, group_id),
            )),
            None => Err(CommunityError::invalid(
                "parent_id",
                format!("field {} does not exist", parent_id),
            )),
        }
    }
}

fn validate_name(name: &str) -> Result<(), CommunityError> {
    if name.trim().is_empty() {
        return Err(CommunityError::invalid("name", "a field name is required"));
    }
    Ok(())
}

fn validate_options(field_type: FieldType, options: &[NewOption]) -> Result<(), CommunityError> {
    if !options.is_empty() && !field_type.is_choice() {
        return Err(CommunityError::invalid(
            "options",
            format!("fields of type '{}' do not take options", field_type),
        ));
    }
    if options.iter().any(|o| o.name.trim().is_empty()) {
        return Err(CommunityError::invalid("options", "option names cannot be empty"));
    }
    Ok(())
}

/// A field with its options and their meta, as read at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSnapshot {
    pub field: ProfileField,
    pub options: Vec<ProfileField>,
    meta: HashMap<u64, HashMap<String, serde_json::Value>>,
}

/// Container holding all community records.
///
/// Every map sits behind one lock so a field and its options always change
/// together.
#[derive(Debug, Default)]
pub struct Community {
    state: RwLock<CommunityState>,
}

impl Community {
    /// Creates an empty community.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, CommunityState>, CommunityError> {
        self.state.read().map_err(|_| CommunityError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, CommunityState>, CommunityError> {
        self.state.write().map_err(|_| CommunityError::LockPoisoned)
    }

    // ----- members -----

    /// Registers a member.
    ///
    /// A random token is generated when `token` is `None`.
    pub fn add_member(
        &self,
        name: impl Into<String>,
        role: Role,
        token: Option<String>,
    ) -> Result<Member, CommunityError> {
        let mut state = self.write()?;
        let token = token.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        if let Some(existing) = state.members.values().find(|m| m.token == token) {
            return Err(CommunityError::DuplicateToken {
                member_id: existing.id,
            });
        }
        let id = state.next_member_id;
        state.next_member_id += 1;
        let member = Member {
            id,
            name: name.into(),
            role,
            token,
        };
        state.members.insert(id, member.clone());
        tracing::debug!("Registered member {} ({})", id, role);
        Ok(member)
    }

    /// Looks up a member by id.
    pub fn member(&self, id: u64) -> Result<Member, CommunityError> {
        let state = self.read()?;
        state
            .members
            .get(&id)
            .cloned()
            .ok_or(CommunityError::MemberNotFound { id })
    }

    /// Looks up the member owning an API token.
    pub fn member_by_token(&self, token: &str) -> Result<Option<Member>, CommunityError> {
        let state = self.read()?;
        Ok(state.members.values().find(|m| m.token == token).cloned())
    }

    pub fn member_count(&self) -> Result<usize, CommunityError> {
        Ok(self.read()?.members.len())
    }

    // ----- groups -----

    /// Creates a profile field group.
    pub fn create_group(&self, group: NewFieldGroup) -> Result<FieldGroup, CommunityError> {
        if group.name.trim().is_empty() {
            return Err(CommunityError::invalid("name", "a group name is required"));
        }
        let mut state = self.write()?;
        let id = state.next_group_id;
        state.next_group_id += 1;
        let group = FieldGroup {
            id,
            name: group.name.trim().to_string(),
            description: group.description,
            group_order: group.group_order,
            can_delete: group.can_delete,
        };
        state.groups.insert(id, group.clone());
        tracing::info!("Created profile field group {} '{}'", id, group.name);
        Ok(group)
    }

    /// Looks up a group by id.
    pub fn group(&self, id: u64) -> Result<FieldGroup, CommunityError> {
        let state = self.read()?;
        state
            .groups
            .get(&id)
            .cloned()
            .ok_or(CommunityError::FieldGroupNotFound { id })
    }

    /// Returns all groups in display order.
    pub fn groups(&self) -> Result<Vec<FieldGroup>, CommunityError> {
        let state = self.read()?;
        let mut groups: Vec<FieldGroup> = state.groups.values().cloned().collect();
        groups.sort_by_key(|g| (g.group_order, g.id));
        Ok(groups)
    }

    // ----- fields -----

    /// Creates a field, and its options for choice types.
    ///
    /// # Errors
    /// - `FieldGroupNotFound` when the group does not exist
    /// - `InvalidValue` for a blank name, a bad parent or options on a
    ///   non-choice type
    /// - `InvalidFieldType` when asked to create an `option` directly
    pub fn create_field(&self, field: NewField) -> Result<ProfileField, CommunityError> {
        if field.field_type == FieldType::Option {
            return Err(CommunityError::InvalidFieldType {
                value: FieldType::Option.as_str().to_string(),
            });
        }
        validate_name(&field.name)?;
        validate_options(field.field_type, &field.options)?;

        let mut state = self.write()?;
        if !state.groups.contains_key(&field.group_id) {
            return Err(CommunityError::FieldGroupNotFound { id: field.group_id });
        }
        state.validate_parent(field.parent_id, field.group_id)?;

        let id = state.next_field_id;
        state.next_field_id += 1;
        let created = ProfileField {
            id,
            group_id: field.group_id,
            parent_id: field.parent_id,
            field_type: field.field_type,
            name: field.name.trim().to_string(),
            description: field.description,
            is_required: field.is_required,
            can_delete: field.can_delete,
            field_order: field.field_order,
            option_order: field.option_order,
            order_by: field.order_by,
            is_default_option: field.is_default_option,
            visibility_level: field.visibility_level,
        };
        state.fields.insert(id, created.clone());
        state.insert_options(&created, &field.options);

        tracing::info!(
            "Created profile field {} '{}' ({}) in group {}",
            id,
            created.name,
            created.field_type,
            created.group_id
        );
        Ok(created)
    }

    /// Looks up a field by id. Options are fields too.
    pub fn field(&self, id: u64) -> Result<ProfileField, CommunityError> {
        let state = self.read()?;
        state
            .fields
            .get(&id)
            .cloned()
            .ok_or(CommunityError::FieldNotFound { id })
    }

    /// Lists top-level fields matching `query`, ordered by group order,
    /// then field order.
    pub fn fields(&self, query: &FieldQuery) -> Result<Vec<ProfileField>, CommunityError> {
        let state = self.read()?;
        let mut fields: Vec<ProfileField> = state
            .fields
            .values()
            .filter(|f| f.parent_id == 0 && query.matches(f))
            .cloned()
            .collect();
        fields.sort_by_key(|f| (state.group_order(f.group_id), f.group_id, f.field_order, f.id));
        Ok(fields)
    }

    /// Returns the options of a field, sorted per the field's `order_by`.
    pub fn field_options(&self, field_id: u64) -> Result<Vec<ProfileField>, CommunityError> {
        let state = self.read()?;
        let parent = state
            .fields
            .get(&field_id)
            .ok_or(CommunityError::FieldNotFound { id: field_id })?;
        let mut options: Vec<ProfileField> = state
            .fields
            .values()
            .filter(|f| f.parent_id == field_id && f.field_type == FieldType::Option)
            .cloned()
            .collect();
        options.sort_by_key(|o| (o.option_order, o.id));
        if parent.order_by == OrderBy::Desc {
            options.reverse();
        }
        Ok(options)
    }

    /// Applies a partial update to a field.
    ///
    /// Supplying `options` replaces the field's options wholesale. Changing
    /// a choice field to a non-choice type drops its options.
    pub fn update_field(
        &self,
        id: u64,
        changes: FieldChanges,
    ) -> Result<ProfileField, CommunityError> {
        if let Some(name) = &changes.name {
            validate_name(name)?;
        }
        if changes.field_type == Some(FieldType::Option) {
            return Err(CommunityError::InvalidFieldType {
                value: FieldType::Option.as_str().to_string(),
            });
        }

        let mut state = self.write()?;
        let mut updated = state
            .fields
            .get(&id)
            .cloned()
            .ok_or(CommunityError::FieldNotFound { id })?;
        updated.apply(&changes);

        if !state.groups.contains_key(&updated.group_id) {
            return Err(CommunityError::FieldGroupNotFound {
                id: updated.group_id,
            });
        }
        if updated.parent_id == id {
            return Err(CommunityError::invalid("parent_id", "a field cannot be its own parent"));
        }
        state.validate_parent(updated.parent_id, updated.group_id)?;
        if let Some(options) = &changes.options {
            validate_options(updated.field_type, options)?;
        }

        state.fields.insert(id, updated.clone());

        let drop_options = changes.options.is_some() || !updated.field_type.is_choice();
        if drop_options {
            for child in state.children_of(id) {
                state.remove_field_tree(child);
            }
        }
        if let Some(options) = &changes.options {
            state.insert_options(&updated, options);
        } else {
            // Options follow their parent between groups.
            let children = state.children_of(id);
            for child in children {
                if let Some(option) = state.fields.get_mut(&child) {
                    option.group_id = updated.group_id;
                }
            }
        }

        tracing::info!("Updated profile field {} '{}'", id, updated.name);
        Ok(updated)
    }

    /// Deletes a field with its options, meta and member data.
    ///
    /// Returns the field as it was before deletion.
    pub fn delete_field(&self, id: u64) -> Result<ProfileField, CommunityError> {
        let mut state = self.write()?;
        let field = state
            .fields
            .get(&id)
            .cloned()
            .ok_or(CommunityError::FieldNotFound { id })?;
        Self::remove_deletable(&mut state, field)
    }

    /// Deletes a field only if it still matches `snapshot`.
    ///
    /// # Errors
    /// - `FieldChanged` when the field, its options or their meta differ
    /// - `FieldNotDeletable` when the field is flagged non-deletable
    pub fn delete_field_unchanged(
        &self,
        snapshot: &FieldSnapshot,
    ) -> Result<ProfileField, CommunityError> {
        let mut state = self.write()?;
        let id = snapshot.field.id;
        if state.snapshot(id)? != *snapshot {
            return Err(CommunityError::FieldChanged { id });
        }
        Self::remove_deletable(&mut state, snapshot.field.clone())
    }

    fn remove_deletable(
        state: &mut CommunityState,
        field: ProfileField,
    ) -> Result<ProfileField, CommunityError> {
        if !field.can_delete {
            return Err(CommunityError::FieldNotDeletable { id: field.id });
        }
        state.remove_field_tree(field.id);
        tracing::info!("Deleted profile field {} '{}'", field.id, field.name);
        Ok(field)
    }

    /// Removes a field tree whatever its `can_delete` flag. Undoes a create
    /// that could not be completed.
    pub fn discard_field(&self, id: u64) -> Result<ProfileField, CommunityError> {
        let mut state = self.write()?;
        let field = state
            .fields
            .get(&id)
            .cloned()
            .ok_or(CommunityError::FieldNotFound { id })?;
        state.remove_field_tree(id);
        tracing::info!("Discarded profile field {} '{}'", id, field.name);
        Ok(field)
    }

    /// Reads a field with its options and their meta in one step.
    pub fn snapshot_field(&self, id: u64) -> Result<FieldSnapshot, CommunityError> {
        self.read()?.snapshot(id)
    }

    /// Puts a field, its options and their meta back as captured.
    ///
    /// Options added since the snapshot are removed. Fails with
    /// `FieldNotFound` if the field was deleted in the meantime.
    pub fn restore_field(&self, snapshot: FieldSnapshot) -> Result<(), CommunityError> {
        let mut state = self.write()?;
        let id = snapshot.field.id;
        if !state.fields.contains_key(&id) {
            return Err(CommunityError::FieldNotFound { id });
        }
        for child in state.children_of(id) {
            state.remove_field_tree(child);
        }
        state.field_meta.remove(&id);
        state.fields.insert(id, snapshot.field);
        for option in snapshot.options {
            state.fields.insert(option.id, option);
        }
        state.field_meta.extend(snapshot.meta);
        tracing::info!("Restored profile field {}", id);
        Ok(())
    }

    // ----- field meta -----

    /// Reads one meta value of a field.
    pub fn field_meta(
        &self,
        field_id: u64,
        key: &str,
    ) -> Result<Option<serde_json::Value>, CommunityError> {
        let state = self.read()?;
        if !state.fields.contains_key(&field_id) {
            return Err(CommunityError::FieldNotFound { id: field_id });
        }
        Ok(state
            .field_meta
            .get(&field_id)
            .and_then(|meta| meta.get(key))
            .cloned())
    }

    /// Writes one meta value of a field.
    pub fn update_field_meta(
        &self,
        field_id: u64,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), CommunityError> {
        let mut state = self.write()?;
        if !state.fields.contains_key(&field_id) {
            return Err(CommunityError::FieldNotFound { id: field_id });
        }
        state
            .field_meta
            .entry(field_id)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    /// Removes one meta value of a field, returning it.
    pub fn delete_field_meta(
        &self,
        field_id: u64,
        key: &str,
    ) -> Result<Option<serde_json::Value>, CommunityError> {
        let mut state = self.write()?;
        Ok(state
            .field_meta
            .get_mut(&field_id)
            .and_then(|meta| meta.remove(key)))
    }

    // ----- member field data -----

    /// Stores a member's value(s) for a top-level field.
    pub fn set_field_data(
        &self,
        field_id: u64,
        member_id: u64,
        values: Vec<String>,
    ) -> Result<(), CommunityError> {
        let mut state = self.write()?;
        if !state.members.contains_key(&member_id) {
            return Err(CommunityError::MemberNotFound { id: member_id });
        }
        match state.fields.get(&field_id) {
            Some(field) if field.parent_id == 0 => {}
            Some(_) => {
                return Err(CommunityError::invalid(
                    "field_id",
                    "member data is stored on top-level fields only",
                ))
            }
            None => return Err(CommunityError::FieldNotFound { id: field_id }),
        }
        if values.is_empty() {
            state.field_data.remove(&(field_id, member_id));
        } else {
            state.field_data.insert((field_id, member_id), values);
        }
        Ok(())
    }

    /// Reads a member's value(s) for a field.
    pub fn field_data(
        &self,
        field_id: u64,
        member_id: u64,
    ) -> Result<Option<Vec<String>>, CommunityError> {
        let state = self.read()?;
        Ok(state.field_data.get(&(field_id, member_id)).cloned())
    }
}
