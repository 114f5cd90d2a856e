//! Proc macros for the confdir crate.
//!
//! This crate provides the `#[derive(Config)]` macro

use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, Expr, Lit, parse_macro_input, spanned::Spanned};

/// File formats with a stock serializer.
enum Format {
    Json,
    Toml,
}

/// Configuration options parsed from `#[config(...)]` attribute.
struct ConfigOptions {
    name: Option<String>,
    format: Format,
}

impl ConfigOptions {
    fn from_attrs(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut name = None;
        let mut format = Format::Json;

        for attr in attrs {
            if attr.path().is_ident("config") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("name") {
                        name = Some(parse_str(meta.value()?.parse()?, "name")?);
                    } else if meta.path.is_ident("format") {
                        let value: Expr = meta.value()?.parse()?;
                        let span = value.span();
                        format = match parse_str(value, "format")?.as_str() {
                            "json" => Format::Json,
                            "toml" => Format::Toml,
                            other => {
                                return Err(syn::Error::new(
                                    span,
                                    format!("unsupported format `{other}`, expected \"json\" or \"toml\""),
                                ));
                            }
                        };
                    } else {
                        return Err(syn::Error::new(
                            meta.path.span(),
                            format!("unknown config attribute: {:?}", meta.path.get_ident()),
                        ));
                    }
                    Ok(())
                })?;
            }
        }

        Ok(Self { name, format })
    }
}

fn parse_str(value: Expr, what: &str) -> syn::Result<String> {
    if let Expr::Lit(expr_lit) = value {
        if let Lit::Str(lit_str) = expr_lit.lit {
            Ok(lit_str.value())
        } else {
            Err(syn::Error::new(
                expr_lit.span(),
                format!("{what} must be a string"),
            ))
        }
    } else {
        Err(syn::Error::new(value.span(), format!("{what} must be a literal")))
    }
}

/// Derive macro for the `Config` trait.
///
/// This macro automatically:
/// - Implements the `Config` trait with the config name and a stock serializer
/// - Registers the config type with `inventory` for `load_registered`
///
/// `name` defaults to the lowercased type name, `format` to `"json"`. The type
/// must also implement `Default`, `Serialize` and `Deserialize`.
///
/// # Example
///
/// ```rust,ignore
/// use confdir::Config;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize, Config)]
/// #[config(name = "app", format = "toml")]
/// struct AppConfig {
///     name: String,
///     port: u16,
/// }
/// ```
///
/// This expands to roughly:
///
/// ```rust,ignore
/// impl confdir::Config for AppConfig {
///     const NAME: &'static str = "app";
///     type Serializer = confdir::TomlSerializer<Self>;
/// }
///
/// confdir::submit_config!(AppConfig);
/// ```
#[proc_macro_derive(Config, attributes(config))]
pub fn derive_config(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_config_impl(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_config_impl(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "Config cannot be derived for generic types",
        ));
    }

    let options = ConfigOptions::from_attrs(&input.attrs)?;
    let ident = &input.ident;
    let name = options
        .name
        .unwrap_or_else(|| ident.to_string().to_lowercase());

    let serializer = match options.format {
        Format::Json => quote! { ::confdir::JsonSerializer<Self> },
        Format::Toml => quote! { ::confdir::TomlSerializer<Self> },
    };

    Ok(quote! {
        impl ::confdir::Config for #ident {
            const NAME: &'static str = #name;
            type Serializer = #serializer;
        }

        ::confdir::submit_config!(#ident);
    })
}
