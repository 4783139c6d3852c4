use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Field, Fields, Ident, LitStr, Path};

pub fn derive_model_item(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let attrs = extract_struct_attrs(&input);
    let type_name = attrs.type_name.unwrap_or_else(|| name.to_string());

    let fields = named_fields(&input);
    let key_field = extract_marked_field(&fields, "key", "id");
    let owner_field = extract_marked_field(&fields, "owner", "owner");

    // Declared fields in order, without the owner handle
    let data_fields: Vec<&Ident> = fields
        .iter()
        .filter_map(|f| f.ident.as_ref())
        .filter(|f| **f != owner_field)
        .collect();
    let field_names: Vec<String> = data_fields.iter().map(|f| f.to_string()).collect();
    let merged_fields: Vec<&Ident> = data_fields
        .iter()
        .copied()
        .filter(|f| **f != key_field)
        .collect();

    let compare_body = match attrs.order {
        Some(path) => quote! { #path(self, other) },
        None => quote! {
            let _ = other;
            None
        },
    };

    let expanded = quote! {
        impl #impl_generics synced_rust::ModelItem for #name #ty_generics #where_clause {
            const TYPE_NAME: &'static str = #type_name;
            const FIELDS: &'static [&'static str] = &[#(#field_names),*];

            fn key(&self) -> synced_rust::ItemKey {
                synced_rust::ItemKey::from(self.#key_field.to_string())
            }

            fn owner(&self) -> Option<synced_rust::ModelId> {
                self.#owner_field
            }

            fn set_owner(&mut self, owner: Option<synced_rust::ModelId>) {
                self.#owner_field = owner;
            }

            fn compare(&self, other: &Self) -> Option<::std::cmp::Ordering> {
                #compare_body
            }

            fn serialized(&self) -> synced_rust::FieldMap {
                let mut map = synced_rust::FieldMap::new();
                #(
                    map.insert(
                        #field_names.to_string(),
                        synced_rust::FieldValue::to_render(&self.#data_fields),
                    );
                )*
                map
            }

            fn field(&self, name: &str) -> Option<synced_rust::RenderValue> {
                match name {
                    #(
                        #field_names => Some(synced_rust::FieldValue::to_render(&self.#data_fields)),
                    )*
                    _ => None,
                }
            }

            fn merged_with(&self, incoming: &Self) -> Self {
                Self {
                    #key_field: incoming.#key_field.clone(),
                    #(
                        #merged_fields: if synced_rust::FieldValue::is_unset(&incoming.#merged_fields) {
                            self.#merged_fields.clone()
                        } else {
                            incoming.#merged_fields.clone()
                        },
                    )*
                    #owner_field: self.#owner_field,
                }
            }

            fn changed_fields(&self, other: &Self) -> Vec<&'static str> {
                let mut changed = Vec::new();
                #(
                    if self.#data_fields != other.#data_fields {
                        changed.push(#field_names);
                    }
                )*
                changed
            }
        }
    };

    TokenStream::from(expanded)
}

#[derive(Default)]
struct StructAttrs {
    type_name: Option<String>,
    order: Option<Path>,
}

fn extract_struct_attrs(input: &DeriveInput) -> StructAttrs {
    let mut attrs = StructAttrs::default();

    for attr in &input.attrs {
        if !attr.path().is_ident("item") {
            continue;
        }

        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("type_name") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.type_name = Some(value.value());
            } else if meta.path.is_ident("order") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.order = Some(value.parse()?);
            }
            Ok(())
        });

        if let Err(err) = result {
            panic!("ModelItem derive: invalid #[item(...)] attribute: {}", err);
        }
    }

    attrs
}

fn named_fields(input: &DeriveInput) -> Vec<&Field> {
    match &input.data {
        Data::Struct(data_struct) => match &data_struct.fields {
            Fields::Named(fields) => fields.named.iter().collect(),
            _ => panic!("ModelItem derive only supports structs with named fields"),
        },
        _ => panic!("ModelItem derive only supports structs"),
    }
}

fn extract_marked_field(fields: &[&Field], marker: &str, default_name: &str) -> Ident {
    for field in fields {
        for attr in &field.attrs {
            if !attr.path().is_ident("item") {
                continue;
            }

            let mut is_marked = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(marker) {
                    is_marked = true;
                }
                Ok(())
            });
            if is_marked {
                if let Some(ident) = &field.ident {
                    return ident.clone();
                }
            }
        }
    }

    // Default: look for a field with the conventional name
    for field in fields {
        if let Some(ident) = &field.ident {
            if ident == default_name {
                return ident.clone();
            }
        }
    }

    panic!(
        "ModelItem derive: no field marked with #[item({})] and no field named `{}`",
        marker, default_name
    );
}
