//! Old-style virtual servers
//!
//! Servers without a `namespace` carry their policy in component sections
//! (`authorize { }`, `authenticate { }`, ...). During bootstrap each
//! component section gets its sub-policy names registered as dynamic types.

use crate::error::{VirtualServerError, VirtualServerResult};
use crate::types::{TypeRegistrar, relocate};
use radius_policy::{Component, ConfigItem, ConfigPair, ConfigSection};
use std::collections::HashSet;

/// Rewrite bare words in an `authenticate` section into subsections
///
/// `authenticate { pap }` becomes `authenticate { Auth-Type pap { pap } }`.
/// Old configurations list authentication modules directly; this turns each
/// into a sub-policy of the same name that runs that module. Delete this
/// pass together with support for such configurations.
///
/// The bare word is replaced, not kept beside the new subsection: running
/// `authenticate` with subtype 0 no longer calls that module directly.
pub fn normalize_bare_words(section: &mut ConfigSection, type_name: &str) {
    for item in &mut section.items {
        let ConfigItem::Pair(pair) = item else {
            continue;
        };

        let pair: ConfigPair = pair.clone();
        let mut subcs = ConfigSection::named(type_name, pair.attr.clone());
        subcs.location = pair.location.clone();
        subcs.items.push(ConfigItem::Pair(pair));
        *item = ConfigItem::Section(subcs);
    }
}

/// Register the sub-policy names of one component section
///
/// Fails on a duplicate sub-policy name, a missing type attribute, or a
/// name the dictionary defines with the reserved value 0. Nameless
/// subsections are left for the compiler to reject.
pub fn define_types_deprecated(
    registrar: &TypeRegistrar,
    section: &mut ConfigSection,
    component: Component,
) -> VirtualServerResult<()> {
    let Some(ta) = component.type_attribute() else {
        return Ok(());
    };
    let da = registrar.attribute(ta, &section.location)?;

    if component == Component::Authenticate {
        normalize_bare_words(section, ta.name);
    }

    let mut seen = HashSet::new();
    for subcs in section.sections_named(ta.name) {
        let Some(name) = subcs.name2.as_deref() else {
            continue;
        };
        if !seen.insert(name) {
            return Err(VirtualServerError::schema(
                &subcs.location,
                format!("Duplicate configuration section {} {}", ta.name, name),
            ));
        }
        registrar.define(&da, name).map_err(|e| relocate(e, &subcs.location))?;
    }

    Ok(())
}
