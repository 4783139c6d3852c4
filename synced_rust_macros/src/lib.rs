mod model_item;

use proc_macro::TokenStream;

/// Derive macro implementing `synced_rust::ModelItem` for a struct with named fields.
///
/// # Usage
///
/// ```ignore
/// use synced_rust::{ModelId, ModelItem};
///
/// #[derive(Clone, Debug, Default, ModelItem)]
/// #[item(order = "Member::display_order")]
/// pub struct Member {
///     #[item(key)]
///     pub user_id: String,
///     pub display_name: String,
///     pub power_level: i64,
///     #[item(owner)]
///     pub owner: Option<ModelId>,
/// }
/// ```
///
/// - `#[item(key)]` marks the identity field. If omitted, defaults to a field named `id`.
/// - `#[item(owner)]` marks the `Option<ModelId>` owner handle. If omitted, defaults to
///   a field named `owner`. The owner handle is never serialized, compared or merged.
/// - `#[item(order = "path")]` names a `fn(&Self, &Self) -> Option<Ordering>` used to
///   sort records. Without it, models keep insertion order.
/// - `#[item(type_name = "...")]` overrides the canonical type name (defaults to the
///   struct name), which is the tag of `SyncId::of::<Self>()`.
///
/// Every other field must implement `synced_rust::FieldValue`.
#[proc_macro_derive(ModelItem, attributes(item))]
pub fn derive_model_item(input: TokenStream) -> TokenStream {
    model_item::derive_model_item(input)
}
