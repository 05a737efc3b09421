//! Single-pass parser for Oberon-0.
//!
//! The parser is the compilation driver: recognizing a construct emits
//! its code immediately through the [`Generator`], and no syntax tree is
//! built. Semantic checks happen inline against the symbol table.
//!
//! Errors do not stop the parse. Diagnostics are collected, an erroneous
//! expression is replaced by a constant-zero placeholder item so that
//! the generator's invariants keep holding, and small sync loops skip to
//! the next recognizable construct.

use std::rc::Rc;

use log::debug;

use oberon0_dsl::core::{FileId, SourceSpan};
use oberon0_dsl::diagnostic::{Diagnostic, Label};
use oberon0_dsl::problems::Problem;
use oberon0_dsl::scope::{DeclHandle, DeclKind, Declaration, Param, ParamMode, SymbolTable};
use oberon0_dsl::types::{Type, WORD_SIZE};

use oberon0_codegen::{AluOp, BoolOp, Cond, Generator, Instruction, Item, ItemKind, Position};

use crate::lexer::tokenize;
use crate::token::{Token, TokenType};

/// Compiles a full Oberon-0 program to abstract machine instructions.
///
/// All diagnostics found in the source are returned together; the
/// instruction stream is only returned when there were none.
pub fn compile(source: &str, file_id: &FileId) -> Result<Vec<Instruction>, Vec<Diagnostic>> {
    let (tokens, mut diagnostics) = tokenize(source, file_id);
    let mut parser = Parser::new(tokens);
    parser.parse_module();
    diagnostics.extend(parser.diagnostics);
    if diagnostics.is_empty() {
        let instructions = parser.generator.finish();
        debug!("compiled {} instructions", instructions.len());
        Ok(instructions)
    } else {
        debug!("compilation produced {} diagnostics", diagnostics.len());
        Err(diagnostics)
    }
}

/// An infix operator position: integer operators go to the ALU, boolean
/// connectives to the short-circuit jump logic.
enum InfixOp {
    Int(AluOp),
    Bool(BoolOp),
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    diagnostics: Vec<Diagnostic>,
    symbols: SymbolTable,
    generator: Generator,
    int_ty: Rc<Type>,
    bool_ty: Rc<Type>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            index: 0,
            diagnostics: Vec::new(),
            symbols: SymbolTable::new(),
            generator: Generator::new(),
            int_ty: Rc::new(Type::Int),
            bool_ty: Rc::new(Type::Bool),
        }
    }

    ////////////////////////////////////////////////////////////////////
    // Token access and error reporting
    ////////////////////////////////////////////////////////////////////

    fn current(&self) -> &Token {
        // The token list always ends with Eof, which advance never moves
        // past.
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> TokenType {
        self.current().token_type
    }

    fn span(&self) -> SourceSpan {
        self.current().span.clone()
    }

    fn text(&self) -> String {
        self.current().text.clone()
    }

    fn advance(&mut self) {
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
    }

    /// Records a diagnostic, attaching the current token's position to
    /// diagnostics that came out of the generator without one.
    fn report(&mut self, diagnostic: Diagnostic) {
        let diagnostic = diagnostic.relocate(&self.span());
        self.diagnostics.push(diagnostic);
    }

    fn report_unexpected(&mut self, message: &str) {
        let diagnostic = Diagnostic::problem(
            Problem::UnexpectedToken,
            Label::span(self.span(), message),
        )
        .with_context("found", &self.current().text);
        self.diagnostics.push(diagnostic);
    }

    /// Consumes the expected token, or reports and leaves the position
    /// unchanged so that the construct that follows can still be
    /// recognized.
    fn expect(&mut self, kind: TokenType, message: &str) {
        if self.kind() == kind {
            self.advance();
        } else {
            self.report_unexpected(message);
        }
    }

    fn check(&mut self, result: Result<(), Diagnostic>) {
        if let Err(diagnostic) = result {
            self.report(diagnostic);
        }
    }

    /// A constant zero standing in for an expression that could not be
    /// compiled. Keeps the generator's register accounting intact.
    fn placeholder(&self) -> Item {
        Item::constant(self.int_ty.clone(), 0)
    }

    fn item_or_placeholder(&mut self, result: Result<Item, Diagnostic>) -> Item {
        match result {
            Ok(item) => item,
            Err(diagnostic) => {
                self.report(diagnostic);
                self.placeholder()
            }
        }
    }

    /// Returns the item unchanged when it is an integer, otherwise
    /// reports and substitutes a placeholder of the right type.
    fn coerce_int(&mut self, item: Item) -> Item {
        if item.ty.is_int() {
            item
        } else {
            self.report(Diagnostic::problem(
                Problem::NotInteger,
                Label::span(self.span(), "int?"),
            ));
            self.placeholder()
        }
    }

    fn coerce_bool(&mut self, item: Item) -> Item {
        if item.ty.is_bool() {
            item
        } else {
            self.report(Diagnostic::problem(
                Problem::NotBoolean,
                Label::span(self.span(), "bool?"),
            ));
            Item::constant(self.bool_ty.clone(), 0)
        }
    }

    fn false_chain(item: &Item) -> Position {
        match item.kind {
            ItemKind::Condition { false_chain, .. } => false_chain,
            _ => 0,
        }
    }

    /// Skips to a token that can end or follow a statement.
    fn sync_statement(&mut self) {
        while !matches!(
            self.kind(),
            TokenType::Semicolon
                | TokenType::End
                | TokenType::Else
                | TokenType::Elsif
                | TokenType::Until
                | TokenType::Eof
        ) {
            self.advance();
        }
    }

    ////////////////////////////////////////////////////////////////////
    // Expressions
    ////////////////////////////////////////////////////////////////////

    fn number_value(&mut self) -> i32 {
        let token = self.current();
        let parsed = if token.token_type == TokenType::HexNumber {
            i32::from_str_radix(&token.text[1..], 16)
        } else {
            token.text.parse::<i32>()
        };
        match parsed {
            Ok(value) => value,
            Err(_) => {
                let text = self.text();
                self.report(
                    Diagnostic::problem(
                        Problem::NumberTooLarge,
                        Label::span(self.span(), "number too large for int"),
                    )
                    .with_context("literal", &text),
                );
                0
            }
        }
    }

    /// Array indexing and record field selection, `x[i]` and `x.f`,
    /// repeated.
    fn parse_selector(&mut self, mut x: Item) -> Item {
        loop {
            match self.kind() {
                TokenType::LeftBracket => {
                    self.advance();
                    let index = self.parse_expression();
                    if matches!(x.ty.as_ref(), Type::Array(_)) {
                        let index = self.coerce_int(index);
                        let result = self.generator.index(x, index);
                        x = self.item_or_placeholder(result);
                    } else {
                        self.report(Diagnostic::problem(
                            Problem::NotAnArray,
                            Label::span(self.span(), "not an array"),
                        ));
                        x = self.placeholder();
                    }
                    self.expect(TokenType::RightBracket, "]?");
                }
                TokenType::Period => {
                    self.advance();
                    if self.kind() != TokenType::Identifier {
                        self.report_unexpected("ident?");
                        break;
                    }
                    let name = self.text();
                    let span = self.span();
                    self.advance();
                    if !matches!(x.ty.as_ref(), Type::Record(_)) {
                        self.report(Diagnostic::problem(
                            Problem::NotARecord,
                            Label::span(span, "not a record"),
                        ));
                        x = self.placeholder();
                        continue;
                    }
                    let ty = x.ty.clone();
                    match ty.find_field(&name) {
                        Some(field) => {
                            let result = self.generator.field(x, field);
                            x = self.item_or_placeholder(result);
                        }
                        None => {
                            self.report(
                                Diagnostic::problem(
                                    Problem::NoSuchField,
                                    Label::span(span, "no such field"),
                                )
                                .with_context("field", &name),
                            );
                            x = self.placeholder();
                        }
                    }
                }
                _ => break,
            }
        }
        x
    }

    fn starts_factor(&self) -> bool {
        matches!(
            self.kind(),
            TokenType::Identifier
                | TokenType::Number
                | TokenType::HexNumber
                | TokenType::LeftParen
                | TokenType::Not
        )
    }

    fn parse_factor(&mut self) -> Item {
        if !self.starts_factor() {
            self.report_unexpected("factor?");
            while !self.starts_factor()
                && !matches!(
                    self.kind(),
                    TokenType::Semicolon
                        | TokenType::End
                        | TokenType::Else
                        | TokenType::Elsif
                        | TokenType::Until
                        | TokenType::Then
                        | TokenType::Do
                        | TokenType::Of
                        | TokenType::Comma
                        | TokenType::RightParen
                        | TokenType::RightBracket
                        | TokenType::Eof
                )
            {
                self.advance();
            }
            if !self.starts_factor() {
                return self.placeholder();
            }
        }
        match self.kind() {
            TokenType::Identifier => {
                let name = self.text();
                let span = self.span();
                self.advance();
                match self.symbols.lookup(&name).cloned() {
                    Some(decl) => {
                        let result = self.generator.make_item(&decl);
                        let item = self.item_or_placeholder(result);
                        self.parse_selector(item)
                    }
                    None => {
                        self.report(
                            Diagnostic::problem(
                                Problem::UndefinedSymbol,
                                Label::span(span, "undefined"),
                            )
                            .with_context("identifier", &name),
                        );
                        self.placeholder()
                    }
                }
            }
            TokenType::Number | TokenType::HexNumber => {
                let value = self.number_value();
                self.advance();
                Item::constant(self.int_ty.clone(), value)
            }
            TokenType::LeftParen => {
                self.advance();
                let item = if self.kind() != TokenType::RightParen {
                    self.parse_expression()
                } else {
                    self.report_unexpected("factor?");
                    self.placeholder()
                };
                self.expect(TokenType::RightParen, ")?");
                item
            }
            TokenType::Not => {
                self.advance();
                let item = self.parse_factor();
                let item = self.coerce_bool(item);
                let result = self.generator.not(item);
                self.item_or_placeholder(result)
            }
            _ => self.placeholder(),
        }
    }

    /// The shared loop of term and simple-expression parsing: left
    /// operand is already parsed, `op` was consumed, the closure parses
    /// the right operand.
    fn parse_infix(
        &mut self,
        op: InfixOp,
        x: Item,
        operand: fn(&mut Parser) -> Item,
    ) -> Item {
        match op {
            InfixOp::Bool(op) => {
                let x = self.coerce_bool(x);
                let result = self.generator.short_circuit_left(op, x);
                let x = self.item_or_placeholder(result);
                let y = operand(self);
                let y = self.coerce_bool(y);
                let result = self.generator.short_circuit_right(op, x, y);
                self.item_or_placeholder(result)
                    .with_type(self.bool_ty.clone())
            }
            InfixOp::Int(op) => {
                let x = self.coerce_int(x);
                let y = operand(self);
                let y = self.coerce_int(y);
                let result = self.generator.int_op(op, x, y);
                self.item_or_placeholder(result)
            }
        }
    }

    fn parse_term(&mut self) -> Item {
        let mut x = self.parse_factor();
        loop {
            let op = match self.kind() {
                TokenType::Times => InfixOp::Int(AluOp::Mul),
                TokenType::Div => InfixOp::Int(AluOp::Div),
                TokenType::Mod => InfixOp::Int(AluOp::Mod),
                TokenType::And => InfixOp::Bool(BoolOp::And),
                _ => break,
            };
            self.advance();
            x = self.parse_infix(op, x, Parser::parse_factor);
        }
        x
    }

    fn parse_simple_expression(&mut self) -> Item {
        let mut x = match self.kind() {
            TokenType::Plus => {
                self.advance();
                let x = self.parse_term();
                self.coerce_int(x)
            }
            TokenType::Minus => {
                self.advance();
                let x = self.parse_term();
                let x = self.coerce_int(x);
                let result = self.generator.negate(x);
                self.item_or_placeholder(result)
            }
            _ => self.parse_term(),
        };
        loop {
            let op = match self.kind() {
                TokenType::Plus => InfixOp::Int(AluOp::Add),
                TokenType::Minus => InfixOp::Int(AluOp::Sub),
                TokenType::Or => InfixOp::Bool(BoolOp::Or),
                _ => break,
            };
            self.advance();
            x = self.parse_infix(op, x, Parser::parse_term);
        }
        x
    }

    fn parse_expression(&mut self) -> Item {
        let x = self.parse_simple_expression();
        let cond = match self.kind() {
            TokenType::Equal => Cond::Equal,
            TokenType::NotEqual => Cond::NotEqual,
            TokenType::Less => Cond::Less,
            TokenType::LessEqual => Cond::LessEqual,
            TokenType::Greater => Cond::Greater,
            TokenType::GreaterEqual => Cond::GreaterEqual,
            _ => return x,
        };
        self.advance();
        let y = self.parse_simple_expression();
        if x.ty.is_scalar() && Type::compatible(&x.ty, &y.ty) {
            let result = self.generator.relation(cond, x, y);
            self.item_or_placeholder(result)
                .with_type(self.bool_ty.clone())
        } else {
            self.report(Diagnostic::problem(
                Problem::TypeMismatch,
                Label::span(self.span(), "incompatible types"),
            ));
            Item::constant(self.bool_ty.clone(), 0)
        }
    }

    /// Parses an expression that heads a conditional construct, leaving
    /// the condition as a forward jump with a pending false chain.
    fn parse_condition(&mut self) -> Item {
        let condition = self.parse_expression();
        let condition = self.coerce_bool(condition);
        let result = self.generator.cond_forward_jump(condition);
        self.item_or_placeholder(result)
    }

    ////////////////////////////////////////////////////////////////////
    // Statements
    ////////////////////////////////////////////////////////////////////

    fn parse_statement_if(&mut self) {
        self.advance();
        let mut condition = self.parse_condition();
        self.expect(TokenType::Then, "then?");
        self.parse_statement_sequence();
        // Forward jumps to the end of the whole statement, one per taken
        // branch, resolved together at the end.
        let mut end_chain: Position = 0;
        while self.kind() == TokenType::Elsif {
            self.advance();
            end_chain = self.generator.forward_jump(end_chain);
            let chain = Self::false_chain(&condition);
            let result = self.generator.fix_chain(chain);
            self.check(result);
            condition = self.parse_condition();
            self.expect(TokenType::Then, "then?");
            self.parse_statement_sequence();
        }
        let chain = Self::false_chain(&condition);
        if self.kind() == TokenType::Else {
            self.advance();
            end_chain = self.generator.forward_jump(end_chain);
            let result = self.generator.fix_chain(chain);
            self.check(result);
            self.parse_statement_sequence();
        } else {
            let result = self.generator.fix_chain(chain);
            self.check(result);
        }
        let result = self.generator.fix_chain(end_chain);
        self.check(result);
        self.expect(TokenType::End, "end?");
    }

    fn parse_statement_while(&mut self) {
        self.advance();
        let top = self.generator.pc();
        let condition = self.parse_condition();
        self.expect(TokenType::Do, "do?");
        self.parse_statement_sequence();
        self.generator.backward_jump(top);
        let chain = Self::false_chain(&condition);
        let result = self.generator.fix_chain(chain);
        self.check(result);
        self.expect(TokenType::End, "end?");
    }

    fn parse_statement_repeat(&mut self) {
        self.advance();
        let top = self.generator.pc();
        self.parse_statement_sequence();
        if self.kind() == TokenType::Until {
            self.advance();
            let condition = self.parse_expression();
            let condition = self.coerce_bool(condition);
            let result = self.generator.cond_backward_jump(condition, top);
            self.check(result);
        } else {
            self.report_unexpected("until?");
        }
    }

    /// An assignment or a procedure call; both begin with a designator.
    fn parse_statement_identifier(&mut self) {
        let name = self.text();
        let span = self.span();
        self.advance();
        let decl = match self.symbols.lookup(&name).cloned() {
            Some(decl) => decl,
            None => {
                self.report(
                    Diagnostic::problem(Problem::UndefinedSymbol, Label::span(span, "undefined"))
                        .with_context("identifier", &name),
                );
                self.sync_statement();
                return;
            }
        };
        let x = match self.generator.make_item(&decl) {
            Ok(x) => x,
            Err(diagnostic) => {
                self.report(diagnostic);
                self.sync_statement();
                return;
            }
        };
        let x = self.parse_selector(x);
        if self.kind() == TokenType::Assign {
            self.advance();
            let y = self.parse_expression();
            if x.ty.is_scalar() && Type::compatible(&x.ty, &y.ty) {
                let result = self.generator.store(x, y);
                self.check(result);
            } else {
                self.report(Diagnostic::problem(
                    Problem::TypeMismatch,
                    Label::span(self.span(), "incompatible assignment"),
                ));
            }
        } else if self.kind() == TokenType::Equal {
            self.report_unexpected(":= ?");
            self.advance();
            let _ = self.parse_expression();
        } else if let ItemKind::Proc { .. } = x.kind {
            self.parse_call(&decl, x);
        } else {
            self.report_unexpected("statement?");
        }
    }

    /// The argument list and call of a procedure whose designator was
    /// already parsed into `x`.
    fn parse_call(&mut self, decl: &Declaration, x: Item) {
        let params = match &decl.kind {
            DeclKind::Procedure { params, .. } => params.clone(),
            _ => Vec::new(),
        };
        let mut next_param = 0;
        if self.kind() == TokenType::LeftParen {
            self.advance();
            if self.kind() == TokenType::RightParen {
                self.advance();
            } else {
                loop {
                    let argument = self.parse_expression();
                    if next_param < params.len() {
                        let param: &Param = &params[next_param];
                        if Type::compatible(&argument.ty, &param.ty) {
                            let mode = param.mode;
                            let result = self.generator.parameter(argument, mode);
                            if let Err(diagnostic) = result {
                                self.report(diagnostic);
                            }
                        } else {
                            self.report(Diagnostic::problem(
                                Problem::ArgumentTypeMismatch,
                                Label::span(self.span(), "bad param type"),
                            ));
                        }
                        next_param += 1;
                    } else {
                        self.report(Diagnostic::problem(
                            Problem::TooManyArguments,
                            Label::span(self.span(), "too many parameters"),
                        ));
                    }
                    if self.kind() == TokenType::Comma {
                        self.advance();
                    } else if self.kind() == TokenType::RightParen {
                        self.advance();
                        break;
                    } else {
                        self.report_unexpected(") or , ?");
                        break;
                    }
                }
            }
        }
        if next_param < params.len() {
            self.report(
                Diagnostic::problem(
                    Problem::TooFewArguments,
                    Label::span(self.span(), "too few parameters"),
                )
                .with_context("procedure", &decl.name),
            );
        }
        let result = self.generator.call(x);
        self.check(result);
    }

    fn starts_statement(&self) -> bool {
        matches!(
            self.kind(),
            TokenType::Identifier | TokenType::If | TokenType::While | TokenType::Repeat
        )
    }

    fn follows_statement(&self) -> bool {
        matches!(
            self.kind(),
            TokenType::Semicolon
                | TokenType::End
                | TokenType::Else
                | TokenType::Elsif
                | TokenType::Until
                | TokenType::Eof
        )
    }

    fn parse_statement_sequence(&mut self) {
        loop {
            if !self.starts_statement() && !self.follows_statement() {
                self.report_unexpected("statement?");
                while !self.starts_statement() && !self.follows_statement() {
                    self.advance();
                }
            }
            let before = self.diagnostics.len();
            match self.kind() {
                TokenType::Identifier => self.parse_statement_identifier(),
                TokenType::If => self.parse_statement_if(),
                TokenType::While => self.parse_statement_while(),
                TokenType::Repeat => self.parse_statement_repeat(),
                _ => {}
            }
            // An erroneous statement may have abandoned loaded operands;
            // the check resets the cursor either way, and the imbalance is
            // only a problem in its own right when nothing else was
            // reported for the statement.
            let result = self.generator.check_registers();
            if let Err(diagnostic) = result {
                if self.diagnostics.len() == before {
                    self.report(diagnostic);
                }
            }
            if self.kind() == TokenType::Semicolon {
                self.advance();
            } else {
                break;
            }
        }
    }

    ////////////////////////////////////////////////////////////////////
    // Declarations
    ////////////////////////////////////////////////////////////////////

    fn declare(
        &mut self,
        name: String,
        kind: DeclKind,
        ty: Rc<Type>,
        span: &SourceSpan,
        is_param: bool,
    ) -> Option<DeclHandle> {
        let declaration = Declaration {
            name,
            kind,
            ty,
            level: self.generator.level(),
            is_param,
        };
        match self.symbols.declare(declaration, span) {
            Ok(handle) => Some(handle),
            Err(diagnostic) => {
                self.report(diagnostic);
                None
            }
        }
    }

    /// `ident {"," ident} ":"` — the names of a variable, field, or
    /// parameter group.
    fn parse_identifier_list(&mut self) -> Vec<(String, SourceSpan)> {
        let mut names = Vec::new();
        if self.kind() != TokenType::Identifier {
            self.report_unexpected("ident?");
            return names;
        }
        names.push((self.text(), self.span()));
        self.advance();
        while self.kind() == TokenType::Comma {
            self.advance();
            if self.kind() == TokenType::Identifier {
                names.push((self.text(), self.span()));
                self.advance();
            } else {
                self.report_unexpected("ident?");
                break;
            }
        }
        self.expect(TokenType::Colon, ":?");
        names
    }

    fn parse_type(&mut self) -> Rc<Type> {
        let starts_type = |kind: TokenType| {
            matches!(
                kind,
                TokenType::Identifier | TokenType::Array | TokenType::Record
            )
        };
        if !starts_type(self.kind()) {
            self.report_unexpected("type?");
            while !starts_type(self.kind())
                && !matches!(
                    self.kind(),
                    TokenType::Semicolon | TokenType::End | TokenType::Eof
                )
            {
                self.advance();
            }
            if !starts_type(self.kind()) {
                return self.int_ty.clone();
            }
        }
        match self.kind() {
            TokenType::Identifier => {
                let name = self.text();
                let span = self.span();
                self.advance();
                match self.symbols.lookup(&name).cloned() {
                    Some(Declaration {
                        kind: DeclKind::TypeName,
                        ty,
                        ..
                    }) => ty,
                    Some(_) => {
                        self.report(
                            Diagnostic::problem(
                                Problem::UnexpectedToken,
                                Label::span(span, "type?"),
                            )
                            .with_context("identifier", &name),
                        );
                        self.int_ty.clone()
                    }
                    None => {
                        self.report(
                            Diagnostic::problem(
                                Problem::UndefinedSymbol,
                                Label::span(span, "undefined"),
                            )
                            .with_context("identifier", &name),
                        );
                        self.int_ty.clone()
                    }
                }
            }
            TokenType::Array => {
                self.advance();
                let length = self.parse_expression();
                let length = match length.const_value() {
                    Some(value) if value >= 0 => value,
                    Some(_) => {
                        self.report(Diagnostic::problem(
                            Problem::IndexOutOfRange,
                            Label::span(self.span(), "bad index"),
                        ));
                        0
                    }
                    None => {
                        self.report(Diagnostic::problem(
                            Problem::ConstantExpected,
                            Label::span(self.span(), "expression not constant"),
                        ));
                        let _ = self.generator.check_registers();
                        0
                    }
                };
                self.expect(TokenType::Of, "of?");
                let element = self.parse_type();
                Rc::new(Type::array(length, element))
            }
            TokenType::Record => {
                self.advance();
                let mut fields: Vec<(String, Rc<Type>)> = Vec::new();
                loop {
                    if self.kind() == TokenType::Identifier {
                        let names = self.parse_identifier_list();
                        let field_ty = self.parse_type();
                        for (name, span) in names {
                            if fields.iter().any(|(existing, _)| *existing == name) {
                                self.report(Diagnostic::problem(
                                    Problem::MultipleDefinition,
                                    Label::span(
                                        span,
                                        format!("multiple definitions '{}'", name),
                                    ),
                                ));
                            } else {
                                fields.push((name, field_ty.clone()));
                            }
                        }
                    }
                    if self.kind() == TokenType::Semicolon {
                        self.advance();
                    } else if self.kind() == TokenType::Identifier {
                        self.report_unexpected(";?");
                    } else {
                        break;
                    }
                }
                self.expect(TokenType::End, "end?");
                Rc::new(Type::record(fields))
            }
            _ => self.int_ty.clone(),
        }
    }

    /// `const`/`type`/`var` sections, in that order. `offset` is the next
    /// free byte in the enclosing frame (or the module data block) and
    /// advances past every variable declared here.
    fn parse_declarations(&mut self, offset: &mut i32) {
        let in_sync = |kind: TokenType| {
            matches!(
                kind,
                TokenType::Const
                    | TokenType::Type
                    | TokenType::Var
                    | TokenType::Procedure
                    | TokenType::Begin
                    | TokenType::End
                    | TokenType::Eof
            )
        };
        if !in_sync(self.kind()) {
            self.report_unexpected("declaration?");
            while !in_sync(self.kind()) {
                self.advance();
            }
        }
        loop {
            if self.kind() == TokenType::Const {
                self.advance();
                while self.kind() == TokenType::Identifier {
                    let name = self.text();
                    let span = self.span();
                    self.advance();
                    self.expect(TokenType::Equal, "=?");
                    let item = self.parse_expression();
                    match item.const_value() {
                        Some(value) => {
                            self.declare(name, DeclKind::Const { value }, item.ty, &span, false);
                        }
                        None => {
                            self.report(Diagnostic::problem(
                                Problem::ConstantExpected,
                                Label::span(span, "expression not constant"),
                            ));
                            // The rejected expression may have loaded
                            // registers.
                            let _ = self.generator.check_registers();
                        }
                    }
                    self.expect(TokenType::Semicolon, ";?");
                }
            }
            if self.kind() == TokenType::Type {
                self.advance();
                while self.kind() == TokenType::Identifier {
                    let name = self.text();
                    let span = self.span();
                    self.advance();
                    self.expect(TokenType::Equal, "=?");
                    let ty = self.parse_type();
                    self.declare(name, DeclKind::TypeName, ty, &span, false);
                    self.expect(TokenType::Semicolon, ";?");
                }
            }
            if self.kind() == TokenType::Var {
                self.advance();
                while self.kind() == TokenType::Identifier {
                    let names = self.parse_identifier_list();
                    let ty = self.parse_type();
                    for (name, span) in names {
                        self.declare(
                            name,
                            DeclKind::Var { offset: *offset },
                            ty.clone(),
                            &span,
                            false,
                        );
                        *offset += ty.size();
                    }
                    self.expect(TokenType::Semicolon, ";?");
                }
            }
            if matches!(
                self.kind(),
                TokenType::Const | TokenType::Type | TokenType::Var
            ) {
                self.report_unexpected("declaration?");
            } else {
                break;
            }
        }
    }

    /// One `[var] ident {"," ident} ":" type` group of a formal parameter
    /// list. Value parameters occupy slots of their type's size,
    /// reference parameters one word for the address.
    fn parse_formal_parameter_section(
        &mut self,
        param_block_size: &mut i32,
        params: &mut Vec<Param>,
    ) {
        let reference = self.kind() == TokenType::Var;
        if reference {
            self.advance();
        }
        let names = self.parse_identifier_list();
        let ty = if self.kind() == TokenType::Identifier {
            let ty = self.parse_type();
            if !reference && !ty.is_scalar() {
                self.report(Diagnostic::problem(
                    Problem::StructuredValueParameter,
                    Label::span(self.span(), "no struct parameter!"),
                ));
            }
            ty
        } else {
            self.report_unexpected("ident?");
            self.int_ty.clone()
        };
        let slot = if reference { WORD_SIZE } else { ty.size() };
        for (name, span) in names {
            let kind = if reference {
                DeclKind::RefParam {
                    offset: *param_block_size,
                }
            } else {
                DeclKind::Var {
                    offset: *param_block_size,
                }
            };
            self.declare(name, kind, ty.clone(), &span, true);
            params.push(Param {
                mode: if reference {
                    ParamMode::Reference
                } else {
                    ParamMode::Value
                },
                ty: ty.clone(),
            });
            *param_block_size += slot;
        }
    }

    fn parse_procedure_declaration(&mut self) {
        self.advance();
        if self.kind() != TokenType::Identifier {
            self.report_unexpected("ident?");
            return;
        }
        let name = self.text();
        let span = self.span();
        self.advance();
        let handle = self.declare(
            name.clone(),
            DeclKind::Procedure {
                entry: None,
                params: Vec::new(),
            },
            self.int_ty.clone(),
            &span,
            false,
        );
        self.generator.adjust_level(1);
        self.symbols.open_scope();
        // The first frame slot holds the saved link register.
        let mut param_block_size = WORD_SIZE;
        let mut params = Vec::new();
        if self.kind() == TokenType::LeftParen {
            self.advance();
            if self.kind() == TokenType::RightParen {
                self.advance();
            } else {
                self.parse_formal_parameter_section(&mut param_block_size, &mut params);
                while self.kind() == TokenType::Semicolon {
                    self.advance();
                    self.parse_formal_parameter_section(&mut param_block_size, &mut params);
                }
                self.expect(TokenType::RightParen, ")?");
            }
        }
        if let Some(handle) = handle {
            if let DeclKind::Procedure {
                params: declared, ..
            } = &mut self.symbols.decl_mut(handle).kind
            {
                *declared = params;
            }
        }
        let mut local_block_size = param_block_size;
        self.expect(TokenType::Semicolon, ";?");
        self.parse_declarations(&mut local_block_size);
        while self.kind() == TokenType::Procedure {
            self.parse_procedure_declaration();
            self.expect(TokenType::Semicolon, ";?");
        }
        // The body starts here; calls earlier in the text were forward
        // calls and have already been reported.
        let entry = self.generator.pc();
        if let Some(handle) = handle {
            if let DeclKind::Procedure {
                entry: declared, ..
            } = &mut self.symbols.decl_mut(handle).kind
            {
                *declared = Some(entry);
            }
        }
        self.generator.enter(&name, param_block_size, local_block_size);
        if self.kind() == TokenType::Begin {
            self.advance();
            self.parse_statement_sequence();
        }
        self.expect(TokenType::End, "end?");
        if self.kind() == TokenType::Identifier {
            if self.text() != name {
                self.report(
                    Diagnostic::problem(Problem::NameMismatch, Label::span(self.span(), "no match"))
                        .with_context("expected", &name),
                );
            }
            self.advance();
        }
        self.generator.ret(local_block_size);
        self.symbols.close_scope();
        self.generator.adjust_level(-1);
    }

    ////////////////////////////////////////////////////////////////////
    // Module
    ////////////////////////////////////////////////////////////////////

    fn predeclare(&mut self) {
        let span = SourceSpan::default();
        self.declare(
            "integer".to_owned(),
            DeclKind::TypeName,
            self.int_ty.clone(),
            &span,
            false,
        );
        self.declare(
            "bool".to_owned(),
            DeclKind::TypeName,
            self.bool_ty.clone(),
            &span,
            false,
        );
        self.declare(
            "true".to_owned(),
            DeclKind::Const { value: 1 },
            self.bool_ty.clone(),
            &span,
            false,
        );
        self.declare(
            "false".to_owned(),
            DeclKind::Const { value: 0 },
            self.bool_ty.clone(),
            &span,
            false,
        );
    }

    fn parse_module(&mut self) {
        if self.kind() != TokenType::Module {
            self.report_unexpected("module?");
            return;
        }
        self.symbols.open_scope();
        self.predeclare();
        self.advance();
        let name = if self.kind() == TokenType::Identifier {
            let name = self.text();
            self.advance();
            name
        } else {
            self.report_unexpected("ident?");
            "module".to_owned()
        };
        self.generator.open(&name);
        self.expect(TokenType::Semicolon, ";?");
        let mut globals_size = 0;
        self.parse_declarations(&mut globals_size);
        while self.kind() == TokenType::Procedure {
            self.parse_procedure_declaration();
            self.expect(TokenType::Semicolon, ";?");
        }
        debug!("module {}: {} bytes of globals", name, globals_size);
        if self.kind() == TokenType::Begin {
            self.advance();
            self.parse_statement_sequence();
        }
        self.expect(TokenType::End, "end?");
        if self.kind() == TokenType::Identifier {
            if self.text() != name {
                self.report(
                    Diagnostic::problem(Problem::NameMismatch, Label::span(self.span(), "no match"))
                        .with_context("expected", &name),
                );
            }
            self.advance();
        } else {
            self.report_unexpected("ident?");
        }
        self.expect(TokenType::Period, ".?");
        self.symbols.close_scope();
    }
}
