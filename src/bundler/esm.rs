//! ES module rewriting.
//!
//! Every script module becomes a function in a numbered registry:
//!
//! ```text
//! function (__exports, __require) { ...module body... }
//! ```
//!
//! Modules are parsed with `oxc_parser`. [`analyze`] records what a module
//! imports and exports plus the span edits that strip its module syntax;
//! [`ModuleSyntax::render`] resolves specifiers to registry indices and
//! emits the body. Static imports turn into `__require(N)` bindings hoisted
//! to the top of the body, dynamic `import()` into an already-resolved
//! promise of the same, and exports into getters on `__exports` so importers
//! always observe the current binding value.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrowFunctionExpression, AwaitExpression, BindingIdentifier, Declaration,
    ExportAllDeclaration, ExportDefaultDeclaration, ExportDefaultDeclarationKind,
    ExportNamedDeclaration, Expression, ForOfStatement, Function, ImportDeclaration,
    ImportDeclarationSpecifier, ImportExpression, MetaProperty, Program, Statement,
    StringLiteral, TemplateElement,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use oxc_syntax::scope::ScopeFlags;

use crate::bundler::minify::{self, Edit};
use crate::utils::js_string_literal;
use crate::BundleError;

/// Name bound to an anonymous default export.
const DEFAULT_BINDING: &str = "__default";

/// Runtime shared by every bundle. `__require` caches before executing so
/// import cycles see a partially initialized module instead of recursing.
const RUNTIME: &str = r#"var __cache = [];
function __require(i) {
var m = __cache[i];
if (m) return m.exports;
m = __cache[i] = { exports: {} };
__modules[i](m.exports, __require);
return m.exports;
}
function __export(target, name, get) {
Object.defineProperty(target, name, { enumerable: true, get: get });
}
function __reexport(target, source) {
Object.keys(source).forEach(function (k) {
if (k !== "default" && !Object.prototype.hasOwnProperty.call(target, k)) __export(target, k, function () { return source[k]; });
});
}"#;

// ---------------------------------------------------------------------------
// ModuleSyntax
// ---------------------------------------------------------------------------

/// The module-level syntax of one script: what it imports and exports, and
/// how to turn its source into a registry function body.
#[derive(Debug, Clone, Default)]
pub struct ModuleSyntax {
    specifiers: Vec<String>,
    prelude: Vec<Prelude>,
    exports: Vec<Export>,
    patches: Vec<Patch>,
    literals: Vec<Span>,
}

/// A statement hoisted to the top of the body.
#[derive(Debug, Clone)]
enum Prelude {
    Import { source: String, bindings: Vec<Binding> },
    ReexportAll { source: String },
}

#[derive(Debug, Clone)]
enum Binding {
    Default(String),
    Namespace(String),
    Named { imported: String, local: String },
}

#[derive(Debug, Clone)]
struct Export {
    name: String,
    value: ExportValue,
}

#[derive(Debug, Clone)]
enum ExportValue {
    Local(String),
    /// `name: None` re-exports the whole namespace.
    Reexport { source: String, name: Option<String> },
}

#[derive(Debug, Clone)]
enum Patch {
    Edit(Edit),
    DynamicImport { span: Span, source: String },
}

impl ModuleSyntax {
    /// Every specifier the module references (static imports, re-exports and
    /// dynamic imports), in source order, deduplicated.
    pub fn specifiers(&self) -> &[String] {
        &self.specifiers
    }

    /// Exported names, in source order. `export *` contributes none.
    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.exports.iter().map(|export| export.name.as_str())
    }

    /// Render `code` (the source this syntax was analyzed from) as a registry
    /// function body.
    ///
    /// `module` names the module in errors; `lookup` maps a specifier to its
    /// registry index.
    pub fn render<F>(
        &self,
        module: &str,
        code: &str,
        lookup: F,
        compact: bool,
    ) -> Result<String, BundleError>
    where
        F: Fn(&str) -> Option<usize>,
    {
        let require = |source: &str| {
            lookup(source)
                .map(|index| format!("__require({index})"))
                .ok_or_else(|| BundleError::UnresolvedImport {
                    specifier: source.to_string(),
                    importer: module.to_string(),
                })
        };

        let mut head = String::new();
        for export in &self.exports {
            let value = match &export.value {
                ExportValue::Local(local) => local.clone(),
                ExportValue::Reexport { source, name: None } => require(source)?,
                ExportValue::Reexport {
                    source,
                    name: Some(name),
                } => member(&require(source)?, name),
            };
            head.push_str(&format!(
                "__export(__exports, {}, function () {{ return {value}; }});\n",
                js_string_literal(&export.name)
            ));
        }
        for statement in &self.prelude {
            match statement {
                Prelude::Import { source, bindings } => {
                    head.push_str(&import_bindings(&require(source)?, bindings));
                }
                Prelude::ReexportAll { source } => {
                    head.push_str(&format!("__reexport(__exports, {});", require(source)?));
                }
            }
            head.push('\n');
        }

        let mut edits = Vec::with_capacity(self.patches.len() + 1);
        edits.push(Edit::insert(0, head));
        for patch in &self.patches {
            edits.push(match patch {
                Patch::Edit(edit) => edit.clone(),
                Patch::DynamicImport { span, source } => Edit::replace(
                    *span,
                    format!(
                        "Promise.resolve().then(function () {{ return {}; }})",
                        require(source)?
                    ),
                ),
            });
        }
        Ok(minify::apply(code, edits, &self.literals, compact))
    }
}

/// `const` bindings for one import declaration, or a bare call when it binds
/// nothing.
fn import_bindings(require: &str, bindings: &[Binding]) -> String {
    let mut statements = Vec::new();
    let mut fields = Vec::new();
    for binding in bindings {
        match binding {
            Binding::Default(local) => statements.push(format!("const {local} = {require}.default;")),
            Binding::Namespace(local) => statements.push(format!("const {local} = {require};")),
            Binding::Named { imported, local } if imported == local => fields.push(local.clone()),
            Binding::Named { imported, local } if is_identifier(imported) => {
                fields.push(format!("{imported}: {local}"));
            }
            Binding::Named { imported, local } => {
                fields.push(format!("{}: {local}", js_string_literal(imported)));
            }
        }
    }
    if !fields.is_empty() {
        statements.push(format!("const {{ {} }} = {require};", fields.join(", ")));
    }
    if statements.is_empty() {
        format!("{require};")
    } else {
        statements.join(" ")
    }
}

fn member(object: &str, name: &str) -> String {
    if is_identifier(name) {
        format!("{object}.{name}")
    } else {
        format!("{object}[{}]", js_string_literal(name))
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Parse one ES module and record its module syntax.
///
/// `module` names the module in errors. Syntax errors fail the build; valid
/// code the registry cannot express (`import.meta`, top-level `await`,
/// computed dynamic imports) is [`BundleError::UnsupportedSyntax`].
pub fn analyze(module: &str, code: &str) -> Result<ModuleSyntax, BundleError> {
    let allocator = Allocator::default();
    let program = parse(&allocator, module, code)?;

    let mut scan = Scan::new(module, code);
    if let Some(hashbang) = &program.hashbang {
        scan.edit(Edit::remove(hashbang.span));
    }
    for comment in &program.comments {
        let (start, end) = (comment.span.start as usize, comment.span.end as usize);
        let spaced = |c: Option<char>| c.map_or(true, char::is_whitespace);
        // A block comment still separates tokens and, spanning lines, ends a statement.
        let keep = if comment.is_line() {
            ""
        } else if code[start..end].contains('\n') {
            "\n"
        } else if spaced(code[..start].chars().next_back()) || spaced(code[end..].chars().next()) {
            ""
        } else {
            " "
        };
        scan.edit(Edit::replace(comment.span, keep));
    }
    for statement in &program.body {
        scan.statement(statement)?;
    }
    scan.visit_program(&program);
    scan.finish()
}

/// `code` with its `export default` rebound to `const <binding> =`, or `None`
/// when it has no default export.
pub fn rebind_default_export(
    module: &str,
    code: &str,
    binding: &str,
) -> Result<Option<String>, BundleError> {
    let allocator = Allocator::default();
    let program = parse(&allocator, module, code)?;
    let Some(decl) = program.body.iter().find_map(|statement| match statement {
        Statement::ExportDefaultDeclaration(decl) => Some(decl),
        _ => None,
    }) else {
        return Ok(None);
    };
    let (start, value) = (decl.span.start as usize, decl.declaration.span().start as usize);
    Ok(Some(format!("{}const {binding} = {}", &code[..start], &code[value..])))
}

fn parse<'a>(
    allocator: &'a Allocator,
    module: &str,
    code: &'a str,
) -> Result<Program<'a>, BundleError> {
    let parsed = Parser::new(allocator, code, SourceType::mjs()).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        let message = parsed
            .errors
            .first()
            .map_or_else(|| "unrecoverable parse error".to_string(), ToString::to_string);
        return Err(BundleError::BuildError(format!("syntax error in {module}: {message}")));
    }
    Ok(parsed.program)
}

struct Scan<'s> {
    module: &'s str,
    source: &'s str,
    syntax: ModuleSyntax,
    /// `(offset, specifier)` for every module reference.
    found: Vec<(u32, String)>,
    /// Function nesting depth while visiting.
    depth: u32,
    error: Option<BundleError>,
}

impl<'s> Scan<'s> {
    fn new(module: &'s str, source: &'s str) -> Self {
        Self {
            module,
            source,
            syntax: ModuleSyntax::default(),
            found: Vec::new(),
            depth: 0,
            error: None,
        }
    }

    fn unsupported(&self, detail: impl Into<String>) -> BundleError {
        BundleError::UnsupportedSyntax {
            module: self.module.to_string(),
            detail: detail.into(),
        }
    }

    fn fail(&mut self, detail: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(self.unsupported(detail));
        }
    }

    fn edit(&mut self, edit: Edit) {
        self.syntax.patches.push(Patch::Edit(edit));
    }

    fn reference(&mut self, literal: &StringLiteral<'_>) -> String {
        let specifier = literal.value.to_string();
        self.found.push((literal.span.start, specifier.clone()));
        specifier
    }

    fn export(&mut self, name: impl Into<String>, value: ExportValue) {
        self.syntax.exports.push(Export {
            name: name.into(),
            value,
        });
    }

    /// Remove a statement; one standing alone on its line takes the line with it.
    fn remove_statement(&mut self, span: Span) {
        let (mut start, mut end) = (span.start as usize, span.end as usize);
        let line_start = self.source[..start].rfind('\n').map_or(0, |i| i + 1);
        if self.source[line_start..start].trim().is_empty() {
            let rest = &self.source[end..];
            let gap = rest.len() - rest.trim_start_matches([' ', '\t']).len();
            let after = &rest[gap..];
            let newline = if after.starts_with("\r\n") {
                Some(2)
            } else if after.starts_with('\n') {
                Some(1)
            } else if after.is_empty() {
                Some(0)
            } else {
                None
            };
            if let Some(newline) = newline {
                start = line_start;
                end += gap + newline;
            }
        }
        self.edit(Edit::remove(Span::new(start as u32, end as u32)));
    }

    fn statement(&mut self, statement: &Statement<'_>) -> Result<(), BundleError> {
        match statement {
            Statement::ImportDeclaration(decl) => self.import(decl),
            Statement::ExportNamedDeclaration(decl) => self.export_named(decl),
            Statement::ExportDefaultDeclaration(decl) => self.export_default(decl),
            Statement::ExportAllDeclaration(decl) => {
                self.export_all(decl);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn import(&mut self, decl: &ImportDeclaration<'_>) -> Result<(), BundleError> {
        if decl.phase.is_some() {
            return Err(self.unsupported("import phase modifier"));
        }
        let source = self.reference(&decl.source);
        let bindings = decl
            .specifiers
            .iter()
            .flatten()
            .map(|specifier| match specifier {
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                    Binding::Default(s.local.name.to_string())
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    Binding::Namespace(s.local.name.to_string())
                }
                ImportDeclarationSpecifier::ImportSpecifier(s) => Binding::Named {
                    imported: s.imported.name().to_string(),
                    local: s.local.name.to_string(),
                },
            })
            .collect();
        self.syntax.prelude.push(Prelude::Import { source, bindings });
        self.remove_statement(decl.span);
        Ok(())
    }

    fn export_named(&mut self, decl: &ExportNamedDeclaration<'_>) -> Result<(), BundleError> {
        if let Some(literal) = &decl.source {
            let source = self.reference(literal);
            for specifier in &decl.specifiers {
                self.export(
                    specifier.exported.name().to_string(),
                    ExportValue::Reexport {
                        source: source.clone(),
                        name: Some(specifier.local.name().to_string()),
                    },
                );
            }
            self.syntax.prelude.push(Prelude::Import {
                source,
                bindings: Vec::new(),
            });
            self.remove_statement(decl.span);
            return Ok(());
        }

        if let Some(declaration) = &decl.declaration {
            for name in self.declared_names(declaration)? {
                self.export(name.clone(), ExportValue::Local(name));
            }
            self.edit(Edit::remove(Span::new(decl.span.start, declaration.span().start)));
            return Ok(());
        }

        for specifier in &decl.specifiers {
            self.export(
                specifier.exported.name().to_string(),
                ExportValue::Local(specifier.local.name().to_string()),
            );
        }
        self.remove_statement(decl.span);
        Ok(())
    }

    fn declared_names(&self, declaration: &Declaration<'_>) -> Result<Vec<String>, BundleError> {
        match declaration {
            Declaration::VariableDeclaration(var) => {
                let mut names = BoundNames::default();
                for declarator in &var.declarations {
                    names.visit_binding_pattern(&declarator.id);
                }
                Ok(names.0)
            }
            Declaration::FunctionDeclaration(function) => Ok(function
                .id
                .iter()
                .map(|id| id.name.to_string())
                .collect()),
            Declaration::ClassDeclaration(class) => {
                Ok(class.id.iter().map(|id| id.name.to_string()).collect())
            }
            _ => Err(self.unsupported("TypeScript export declaration")),
        }
    }

    fn export_default(&mut self, decl: &ExportDefaultDeclaration<'_>) -> Result<(), BundleError> {
        match &decl.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(function) => {
                self.edit(Edit::remove(Span::new(decl.span.start, function.span.start)));
                let local = match &function.id {
                    Some(id) => id.name.to_string(),
                    None => {
                        self.edit(Edit::insert(function.params.span.start, DEFAULT_BINDING));
                        DEFAULT_BINDING.to_string()
                    }
                };
                self.export("default", ExportValue::Local(local));
            }
            ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                self.edit(Edit::remove(Span::new(decl.span.start, class.span.start)));
                let local = match &class.id {
                    Some(id) => id.name.to_string(),
                    None if self.source[class.span.start as usize..].starts_with("class") => {
                        self.edit(Edit::insert(
                            class.span.start + "class".len() as u32,
                            format!(" {DEFAULT_BINDING}"),
                        ));
                        DEFAULT_BINDING.to_string()
                    }
                    None => return Err(self.unsupported("decorated anonymous default class")),
                };
                self.export("default", ExportValue::Local(local));
            }
            ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => {
                return Err(self.unsupported("TypeScript default export"));
            }
            kind => {
                let Some(expression) = kind.as_expression() else {
                    return Err(self.unsupported("default export"));
                };
                self.edit(Edit::replace(
                    Span::new(decl.span.start, expression.span().start),
                    format!("const {DEFAULT_BINDING} = "),
                ));
                self.export("default", ExportValue::Local(DEFAULT_BINDING.to_string()));
            }
        }
        Ok(())
    }

    fn export_all(&mut self, decl: &ExportAllDeclaration<'_>) {
        let source = self.reference(&decl.source);
        match &decl.exported {
            Some(name) => {
                self.export(
                    name.name().to_string(),
                    ExportValue::Reexport {
                        source: source.clone(),
                        name: None,
                    },
                );
                self.syntax.prelude.push(Prelude::Import {
                    source,
                    bindings: Vec::new(),
                });
            }
            None => self.syntax.prelude.push(Prelude::ReexportAll { source }),
        }
        self.remove_statement(decl.span);
    }

    /// Literal text is emitted verbatim, except that `</script` is escaped so
    /// the bundle can be inlined into a `<script>` element.
    fn literal(&mut self, span: Span) {
        self.syntax.literals.push(span);
        let text = self.source[span.start as usize..span.end as usize].to_ascii_lowercase();
        for (offset, _) in text.match_indices("</script") {
            let at = span.start + offset as u32;
            self.edit(Edit::replace(Span::new(at, at + 2), "<\\/"));
        }
    }

    fn finish(mut self) -> Result<ModuleSyntax, BundleError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.found.sort_by_key(|(offset, _)| *offset);
        for (_, specifier) in self.found {
            if !self.syntax.specifiers.contains(&specifier) {
                self.syntax.specifiers.push(specifier);
            }
        }
        self.syntax.literals.sort_by_key(|span| span.start);
        Ok(self.syntax)
    }
}

impl<'a> Visit<'a> for Scan<'_> {
    fn visit_import_expression(&mut self, it: &ImportExpression<'a>) {
        match static_specifier(&it.source) {
            Some(specifier) if it.phase.is_none() => {
                self.found.push((it.source.span().start, specifier.clone()));
                self.syntax.patches.push(Patch::DynamicImport {
                    span: it.span,
                    source: specifier,
                });
            }
            _ => self.fail("dynamic import() with a computed specifier"),
        }
    }

    fn visit_meta_property(&mut self, it: &MetaProperty<'a>) {
        if it.meta.name == "import" {
            self.fail("`import.meta`");
        }
    }

    fn visit_string_literal(&mut self, it: &StringLiteral<'a>) {
        self.literal(it.span);
    }

    fn visit_template_element(&mut self, it: &TemplateElement<'a>) {
        self.literal(it.span);
    }

    fn visit_function(&mut self, it: &Function<'a>, flags: ScopeFlags) {
        self.depth += 1;
        walk::walk_function(self, it, flags);
        self.depth -= 1;
    }

    fn visit_arrow_function_expression(&mut self, it: &ArrowFunctionExpression<'a>) {
        self.depth += 1;
        walk::walk_arrow_function_expression(self, it);
        self.depth -= 1;
    }

    fn visit_await_expression(&mut self, it: &AwaitExpression<'a>) {
        if self.depth == 0 {
            self.fail("top-level `await`");
        }
        walk::walk_await_expression(self, it);
    }

    fn visit_for_of_statement(&mut self, it: &ForOfStatement<'a>) {
        if it.r#await && self.depth == 0 {
            self.fail("top-level `for await`");
        }
        walk::walk_for_of_statement(self, it);
    }
}

fn static_specifier(expression: &Expression<'_>) -> Option<String> {
    match expression {
        Expression::StringLiteral(literal) => Some(literal.value.to_string()),
        Expression::TemplateLiteral(template) if template.expressions.is_empty() => template
            .quasis
            .first()
            .and_then(|quasi| quasi.value.cooked.as_ref())
            .map(ToString::to_string),
        _ => None,
    }
}

/// Names bound by a declaration pattern. Initializers are not entered.
#[derive(Default)]
struct BoundNames(Vec<String>);

impl<'a> Visit<'a> for BoundNames {
    fn visit_binding_identifier(&mut self, it: &BindingIdentifier<'a>) {
        self.0.push(it.name.to_string());
    }

    fn visit_expression(&mut self, _it: &Expression<'a>) {}
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// One registry slot: a display name and a function body.
#[derive(Debug, Clone)]
pub struct RegistryModule {
    pub name: String,
    pub body: String,
}

/// Wrap registry modules into a self-executing bundle that runs module 0.
pub fn render_registry(modules: &[RegistryModule], annotate: bool) -> String {
    let mut out = String::from("(function () {\n\"use strict\";\nvar __modules = [\n");
    for (index, module) in modules.iter().enumerate() {
        if annotate {
            out.push_str(&format!("/* {index}: {} */\n", module.name.replace("*/", "*\\/")));
        }
        out.push_str("function (__exports, __require) {\n");
        if !module.body.is_empty() {
            out.push_str(&module.body);
            out.push('\n');
        }
        out.push('}');
        if index + 1 < modules.len() {
            out.push(',');
        }
        out.push('\n');
    }
    out.push_str("];\n");
    out.push_str(RUNTIME);
    out.push_str("\n__require(0);\n})();\n");
    out
}

/// Statement that injects `css` into the document head at runtime.
pub fn style_injection(css: &str) -> String {
    format!(
        "(function () {{\nvar s = document.createElement(\"style\");\ns.textContent = {};\ndocument.head.appendChild(s);\n}})();\n",
        js_string_literal(css)
    )
}
