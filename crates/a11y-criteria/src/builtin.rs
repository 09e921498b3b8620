//! Built-in tables: WCAG 2.1 A/AA criteria, rule mappings for the three
//! supported tools, and manual test procedures.

use crate::catalogue::WcagLevel::{self, A, AA};

pub(crate) const CRITERIA: &[(&str, &str, WcagLevel)] = &[
    ("1.1.1", "Non-text Content", A),
    ("1.2.1", "Audio-only and Video-only (Prerecorded)", A),
    ("1.2.2", "Captions (Prerecorded)", A),
    ("1.2.3", "Audio Description or Media Alternative (Prerecorded)", A),
    ("1.2.4", "Captions (Live)", AA),
    ("1.2.5", "Audio Description (Prerecorded)", AA),
    ("1.3.1", "Info and Relationships", A),
    ("1.3.2", "Meaningful Sequence", A),
    ("1.3.3", "Sensory Characteristics", A),
    ("1.3.4", "Orientation", AA),
    ("1.3.5", "Identify Input Purpose", AA),
    ("1.4.1", "Use of Color", A),
    ("1.4.2", "Audio Control", A),
    ("1.4.3", "Contrast (Minimum)", AA),
    ("1.4.4", "Resize Text", AA),
    ("1.4.5", "Images of Text", AA),
    ("1.4.10", "Reflow", AA),
    ("1.4.11", "Non-text Contrast", AA),
    ("1.4.12", "Text Spacing", AA),
    ("1.4.13", "Content on Hover or Focus", AA),
    ("2.1.1", "Keyboard", A),
    ("2.1.2", "No Keyboard Trap", A),
    ("2.1.4", "Character Key Shortcuts", A),
    ("2.2.1", "Timing Adjustable", A),
    ("2.2.2", "Pause, Stop, Hide", A),
    ("2.3.1", "Three Flashes or Below Threshold", A),
    ("2.4.1", "Bypass Blocks", A),
    ("2.4.2", "Page Titled", A),
    ("2.4.3", "Focus Order", A),
    ("2.4.4", "Link Purpose (In Context)", A),
    ("2.4.5", "Multiple Ways", AA),
    ("2.4.6", "Headings and Labels", AA),
    ("2.4.7", "Focus Visible", AA),
    ("2.5.1", "Pointer Gestures", A),
    ("2.5.2", "Pointer Cancellation", A),
    ("2.5.3", "Label in Name", A),
    ("2.5.4", "Motion Actuation", A),
    ("3.1.1", "Language of Page", A),
    ("3.1.2", "Language of Parts", AA),
    ("3.2.1", "On Focus", A),
    ("3.2.2", "On Input", A),
    ("3.2.3", "Consistent Navigation", AA),
    ("3.2.4", "Consistent Identification", AA),
    ("3.3.1", "Error Identification", A),
    ("3.3.2", "Labels or Instructions", A),
    ("3.3.3", "Error Suggestion", AA),
    ("3.3.4", "Error Prevention (Legal, Financial, Data)", AA),
    ("4.1.1", "Parsing", A),
    ("4.1.2", "Name, Role, Value", A),
    ("4.1.3", "Status Messages", AA),
];

/// Confidence shorthand for the tables below.
#[derive(Clone, Copy)]
pub(crate) enum C {
    H,
    M,
    L,
}

pub(crate) const AXE_RULES: &[(&str, &[&str], C)] = &[
    ("image-alt", &["1.1.1"], C::H),
    ("input-image-alt", &["1.1.1"], C::H),
    ("area-alt", &["1.1.1", "2.4.4"], C::H),
    ("object-alt", &["1.1.1"], C::H),
    ("svg-img-alt", &["1.1.1"], C::H),
    ("role-img-alt", &["1.1.1"], C::H),
    ("video-caption", &["1.2.2"], C::M),
    ("audio-caption", &["1.2.1"], C::L),
    ("list", &["1.3.1"], C::H),
    ("listitem", &["1.3.1"], C::H),
    ("definition-list", &["1.3.1"], C::H),
    ("dlitem", &["1.3.1"], C::H),
    ("th-has-data-cells", &["1.3.1"], C::H),
    ("td-headers-attr", &["1.3.1"], C::H),
    ("aria-required-children", &["1.3.1"], C::H),
    ("aria-required-parent", &["1.3.1"], C::H),
    ("p-as-heading", &["1.3.1"], C::L),
    ("css-orientation-lock", &["1.3.4"], C::M),
    ("autocomplete-valid", &["1.3.5"], C::H),
    ("link-in-text-block", &["1.4.1"], C::M),
    ("no-autoplay-audio", &["1.4.2"], C::M),
    ("color-contrast", &["1.4.3"], C::H),
    ("meta-viewport", &["1.4.4"], C::H),
    ("avoid-inline-spacing", &["1.4.12"], C::H),
    ("scrollable-region-focusable", &["2.1.1"], C::M),
    ("frame-focusable-content", &["2.1.1"], C::M),
    ("meta-refresh", &["2.2.1"], C::H),
    ("blink", &["2.2.2"], C::H),
    ("marquee", &["2.2.2"], C::H),
    ("bypass", &["2.4.1"], C::M),
    ("document-title", &["2.4.2"], C::H),
    ("link-name", &["2.4.4", "4.1.2"], C::H),
    ("label-content-name-mismatch", &["2.5.3"], C::M),
    ("html-has-lang", &["3.1.1"], C::H),
    ("html-lang-valid", &["3.1.1"], C::H),
    ("valid-lang", &["3.1.2"], C::H),
    ("label", &["3.3.2", "4.1.2"], C::H),
    ("duplicate-id", &["4.1.1"], C::M),
    ("duplicate-id-aria", &["4.1.1"], C::H),
    ("button-name", &["4.1.2"], C::H),
    ("aria-allowed-attr", &["4.1.2"], C::H),
    ("aria-valid-attr", &["4.1.2"], C::H),
    ("aria-valid-attr-value", &["4.1.2"], C::H),
    ("aria-hidden-focus", &["4.1.2"], C::H),
    ("aria-roles", &["4.1.2"], C::H),
    ("frame-title", &["4.1.2"], C::H),
    ("select-name", &["4.1.2"], C::H),
    ("nested-interactive", &["4.1.2"], C::H),
];

/// HTML_CodeSniffer codes as reported by pa11y. Codes not listed here are
/// placed by the criterion segment embedded in the code (`1_4_3`).
pub(crate) const PA11Y_RULES: &[(&str, &[&str], C)] = &[
    ("WCAG2AA.Principle1.Guideline1_1.1_1_1.H37", &["1.1.1"], C::M),
    ("WCAG2AA.Principle1.Guideline1_1.1_1_1.H30.2", &["1.1.1", "2.4.4"], C::M),
    ("WCAG2AA.Principle1.Guideline1_3.1_3_1.H49.B", &["1.3.1"], C::L),
    ("WCAG2AA.Principle1.Guideline1_3.1_3_1.F68", &["1.3.1", "4.1.2"], C::M),
    ("WCAG2AA.Principle1.Guideline1_4.1_4_3.G18.Fail", &["1.4.3"], C::M),
    ("WCAG2AA.Principle1.Guideline1_4.1_4_3.G145.Fail", &["1.4.3"], C::M),
    ("WCAG2AA.Principle2.Guideline2_4.2_4_2.H25.1.NoTitleEl", &["2.4.2"], C::M),
    ("WCAG2AA.Principle2.Guideline2_4.2_4_4.H77,H78,H79,H80,H81", &["2.4.4"], C::L),
    ("WCAG2AA.Principle3.Guideline3_1.3_1_1.H57.2", &["3.1.1"], C::M),
    ("WCAG2AA.Principle3.Guideline3_2.3_2_2.H32.2", &["3.2.2"], C::L),
    ("WCAG2AA.Principle4.Guideline4_1.4_1_1.F77", &["4.1.1"], C::M),
    ("WCAG2AA.Principle4.Guideline4_1.4_1_2.H91.A.NoContent", &["2.4.4", "4.1.2"], C::M),
    ("WCAG2AA.Principle4.Guideline4_1.4_1_2.H91.Button.Name", &["4.1.2"], C::M),
];

pub(crate) const LIGHTHOUSE_RULES: &[(&str, &[&str], C)] = &[
    ("image-alt", &["1.1.1"], C::H),
    ("video-caption", &["1.2.2"], C::M),
    ("list", &["1.3.1"], C::M),
    ("heading-order", &["1.3.1"], C::L),
    ("color-contrast", &["1.4.3"], C::H),
    ("meta-viewport", &["1.4.4"], C::H),
    ("focusable-controls", &["2.1.1"], C::L),
    ("focus-traps", &["2.1.2"], C::L),
    ("bypass", &["2.4.1"], C::M),
    ("document-title", &["2.4.2"], C::H),
    ("logical-tab-order", &["2.4.3"], C::L),
    ("tabindex", &["2.4.3"], C::L),
    ("link-name", &["2.4.4", "4.1.2"], C::M),
    ("html-has-lang", &["3.1.1"], C::H),
    ("html-lang-valid", &["3.1.1"], C::H),
    ("label", &["3.3.2", "4.1.2"], C::M),
    ("duplicate-id-aria", &["4.1.1"], C::M),
    ("aria-allowed-attr", &["4.1.2"], C::M),
    ("button-name", &["4.1.2"], C::M),
    ("frame-title", &["4.1.2"], C::M),
];

/// (criterion, title, steps, tools needed)
pub(crate) const PROCEDURES: &[(&str, &str, &[&str], &[&str])] = &[
    (
        "1.1.1",
        "Verify text alternatives convey the purpose of each image",
        &[
            "List every img, svg, canvas and input[type=image] on the page",
            "For each informative image, confirm the alternative describes its purpose, not its appearance",
            "Confirm decorative images are hidden from assistive technology (empty alt or aria-hidden)",
            "Check complex images (charts, diagrams) have a long description nearby",
        ],
        &["screen reader", "browser devtools"],
    ),
    (
        "1.2.2",
        "Check captions on prerecorded video",
        &[
            "Play each video with captions enabled",
            "Confirm dialogue and meaningful sounds are captioned",
            "Confirm captions are synchronised with the audio",
        ],
        &["media player"],
    ),
    (
        "1.2.3",
        "Check audio description or media alternative",
        &[
            "Identify visual information not conveyed by the soundtrack",
            "Confirm an audio description track or full text alternative covers it",
        ],
        &["media player"],
    ),
    (
        "1.3.1",
        "Verify structure is conveyed programmatically",
        &[
            "Compare visual headings with the heading outline exposed to assistive technology",
            "Confirm lists, tables and form groups use the matching semantic markup",
            "Confirm visually grouped controls are grouped programmatically (fieldset/legend, role=group)",
        ],
        &["screen reader", "accessibility tree inspector"],
    ),
    (
        "1.3.2",
        "Verify reading order matches visual order",
        &[
            "Disable CSS and read the content in DOM order",
            "Confirm the meaning is unchanged from the visual presentation",
        ],
        &["browser devtools", "screen reader"],
    ),
    (
        "1.3.3",
        "Check instructions do not rely on sensory characteristics",
        &["Find instructions that reference shape, size, position or sound", "Confirm each has a non-sensory cue as well"],
        &[],
    ),
    (
        "1.4.1",
        "Check colour is not the only visual means of conveying information",
        &[
            "View the page in greyscale",
            "Confirm links, errors and status indicators are still distinguishable",
        ],
        &["greyscale filter"],
    ),
    (
        "1.4.13",
        "Check content shown on hover or focus",
        &[
            "Trigger every tooltip, popover and custom hover menu",
            "Confirm it can be dismissed without moving pointer or focus",
            "Confirm the pointer can move over the new content without it disappearing",
            "Confirm it stays visible until dismissed or no longer relevant",
        ],
        &["keyboard", "mouse"],
    ),
    (
        "2.1.1",
        "Operate all functionality with the keyboard",
        &[
            "Unplug or ignore the mouse",
            "Tab through the page and activate every control with Enter/Space/arrow keys",
            "Confirm custom widgets respond to their expected keys",
        ],
        &["keyboard"],
    ),
    (
        "2.1.2",
        "Check for keyboard traps",
        &[
            "Tab into every widget, iframe and modal",
            "Confirm focus can always leave using standard keys",
        ],
        &["keyboard"],
    ),
    (
        "2.4.3",
        "Verify focus order is meaningful",
        &[
            "Tab through the page from the top",
            "Confirm focus follows the visual and logical order",
            "Confirm modals move focus in and return it on close",
        ],
        &["keyboard"],
    ),
    (
        "2.4.4",
        "Verify link purpose is clear in context",
        &[
            "List all links with a screen reader links list",
            "Confirm each link's purpose is clear from its text or surrounding context",
        ],
        &["screen reader"],
    ),
    (
        "2.4.6",
        "Check headings and labels describe topic or purpose",
        &["Read every heading and form label out of context", "Confirm each describes the content or input it introduces"],
        &[],
    ),
    (
        "2.4.7",
        "Check focus is visible",
        &["Tab through every interactive element", "Confirm a visible focus indicator is always present"],
        &["keyboard"],
    ),
    (
        "3.2.1",
        "Check focus does not trigger a change of context",
        &["Move focus to each control without activating it", "Confirm no navigation, popup or form submission occurs"],
        &["keyboard"],
    ),
    (
        "3.2.2",
        "Check input does not trigger an unexpected change of context",
        &["Change the value of each form control", "Confirm no unannounced navigation or submission occurs"],
        &["keyboard"],
    ),
    (
        "3.3.1",
        "Verify errors are identified in text",
        &[
            "Submit each form with invalid and missing input",
            "Confirm each error is described in text and associated with its field",
        ],
        &["screen reader"],
    ),
    (
        "3.3.3",
        "Verify error suggestions are offered",
        &["Trigger each validation error", "Confirm a correction suggestion is offered where one is known"],
        &[],
    ),
    (
        "4.1.2",
        "Verify name, role and value of custom components",
        &[
            "Inspect each custom widget in the accessibility tree",
            "Confirm it exposes an accessible name, a correct role and its current state",
            "Change its state and confirm the change is announced",
        ],
        &["screen reader", "accessibility tree inspector"],
    ),
];
