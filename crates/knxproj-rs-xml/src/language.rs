// crates/knxproj-rs-xml/src/language.rs

//! Translation tables and locale resolution of texts.

use crate::xml::XmlDocument;
use std::collections::BTreeMap;

type AttributeTexts = BTreeMap<String, String>;

/// All translations of the loaded documents: locale → translatable id →
/// attribute name → text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageCatalog {
    tables: BTreeMap<String, BTreeMap<String, AttributeTexts>>,
}

impl LanguageCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every `Languages/Language/TranslationUnit/TranslationElement/Translation`
    /// of a document. The first translation registered for a key is kept.
    pub fn add_document(&mut self, document: &XmlDocument) -> usize {
        let mut added = 0;
        for languages in document.root.descendants_named("Languages") {
            for language in languages.children_named("Language") {
                let Some(locale) = language.attr("Identifier") else {
                    continue;
                };
                let table = self.tables.entry(locale.to_string()).or_default();
                for element in language.find_all(&["TranslationUnit", "TranslationElement"]) {
                    let Some(ref_id) = element.attr("RefId") else {
                        continue;
                    };
                    let texts = table.entry(ref_id.to_string()).or_default();
                    for translation in element.children_named("Translation") {
                        if let (Some(attribute), Some(text)) =
                            (translation.attr("AttributeName"), translation.attr("Text"))
                        {
                            texts
                                .entry(attribute.to_string())
                                .or_insert_with(|| text.to_string());
                            added += 1;
                        }
                    }
                }
            }
        }
        added
    }

    /// Looks up a translation without fallback.
    pub fn lookup(&self, locale: &str, id: &str, attribute: &str) -> Option<&str> {
        self.tables
            .get(locale)?
            .get(id)?
            .get(attribute)
            .map(String::as_str)
    }

    /// Returns the translated text for `locale`, or `base` if the locale,
    /// identifier or attribute has no translation. Locales match exactly.
    pub fn resolve_text(&self, id: &str, attribute: &str, base: Option<&str>, locale: Option<&str>) -> String {
        locale
            .and_then(|l| self.lookup(l, id, attribute))
            .or(base)
            .unwrap_or_default()
            .to_string()
    }

    pub fn locales(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Binds the catalog to one locale.
    pub fn resolver<'a>(&'a self, locale: Option<&'a str>) -> LanguageResolver<'a> {
        LanguageResolver {
            catalog: self,
            locale,
        }
    }
}

/// A [`LanguageCatalog`] bound to the locale of a parse invocation.
#[derive(Debug, Clone, Copy)]
pub struct LanguageResolver<'a> {
    catalog: &'a LanguageCatalog,
    locale: Option<&'a str>,
}

impl<'a> LanguageResolver<'a> {
    pub fn text(&self, id: &str, attribute: &str, base: Option<&str>) -> String {
        self.catalog.resolve_text(id, attribute, base, self.locale)
    }

    /// The translation for the bound locale, without fallback.
    pub fn lookup(&self, id: &str, attribute: &str) -> Option<&'a str> {
        self.catalog.lookup(self.locale?, id, attribute)
    }

    pub fn locale(&self) -> Option<&'a str> {
        self.locale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LANGUAGES: &str = r#"<KNX><ManufacturerData><Manufacturer RefId="M-0083">
      <Languages>
        <Language Identifier="de-DE">
          <TranslationUnit RefId="M-0083_A-0001-10-ABCD">
            <TranslationElement RefId="M-0083_A-0001-10-ABCD_O-0">
              <Translation AttributeName="Text" Text="Schalten" />
              <Translation AttributeName="FunctionText" Text="Ein/Aus" />
            </TranslationElement>
          </TranslationUnit>
        </Language>
      </Languages>
    </Manufacturer></ManufacturerData></KNX>"#;

    fn catalog() -> LanguageCatalog {
        let doc = XmlDocument::parse("M-0083/M-0083_A-0001-10-ABCD.xml", LANGUAGES).unwrap();
        let mut catalog = LanguageCatalog::new();
        assert_eq!(catalog.add_document(&doc), 2);
        catalog
    }

    #[test]
    fn test_translation_hit() {
        let catalog = catalog();
        assert_eq!(
            catalog.resolve_text("M-0083_A-0001-10-ABCD_O-0", "Text", Some("Switch"), Some("de-DE")),
            "Schalten"
        );
        assert_eq!(catalog.locales().collect::<Vec<_>>(), vec!["de-DE"]);
    }

    #[test]
    fn test_unknown_locale_falls_back_to_base() {
        let catalog = catalog();
        let resolver = catalog.resolver(Some("fr-FR"));
        assert_eq!(resolver.text("M-0083_A-0001-10-ABCD_O-0", "Text", Some("Switch")), "Switch");
        // Locale matching is exact.
        let resolver = catalog.resolver(Some("de"));
        assert_eq!(resolver.text("M-0083_A-0001-10-ABCD_O-0", "Text", Some("Switch")), "Switch");
    }

    #[test]
    fn test_missing_attribute_and_base() {
        let catalog = catalog();
        let resolver = catalog.resolver(Some("de-DE"));
        assert_eq!(resolver.text("M-0083_A-0001-10-ABCD_O-0", "Description", Some("d")), "d");
        assert_eq!(resolver.text("unknown", "Text", None), "");
    }
}
